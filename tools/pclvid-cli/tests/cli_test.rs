//! Integration tests for the pclvid binary
//!
//! Generates a capture, then drives build -> info -> read -> compare -> bench
//! through the real executable with the built-in lz4 codec.

use std::path::Path;
use std::process::{Command, Output};

use pclvid_core::{ElementType, FieldArray, FieldType, MemorySource, Packet, write_capture};
use tempfile::tempdir;

fn pclvid(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pclvid"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run pclvid")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Capture with a u16 range field, a u8 reflectivity field, a status aux
/// array and one packet with an invalid timestamp.
fn generate_capture(path: &Path) {
    let fields = vec![
        FieldType::new("range", ElementType::U16),
        FieldType::new("reflectivity", ElementType::U8),
    ];
    let packets = (0..8u64)
        .map(|i| {
            let range: Vec<u16> = (0..64).map(|j| (i as u16 * 300).wrapping_add(j * 17)).collect();
            let reflectivity: Vec<u8> = (0..64).map(|j| (i as u8).wrapping_mul(31) ^ j as u8).collect();
            // Packet 3 has no valid timestamp
            let timestamp = if i == 3 { 0 } else { 1_000_000_000 + i * 100_000_000 };
            Packet::new(timestamp)
                .with_field("range", FieldArray::from_values(vec![4, 16], &range).unwrap())
                .with_field("reflectivity", FieldArray::from_values(vec![4, 16], &reflectivity).unwrap())
                .with_aux("status", FieldArray::from_values(vec![1], &[i as u32]).unwrap())
        })
        .collect();

    let mut source = MemorySource::new(fields, packets).with_metadata(br#"{"columns_per_frame":16}"#.to_vec());
    write_capture(path, &mut source).expect("Failed to write capture");
}

#[test]
fn test_build_info_read_compare() {
    let dir = tempdir().expect("Failed to create temp dir");
    let capture = dir.path().join("drive.pclcap");
    let archive = dir.path().join("drive.pclv");
    let decoded = dir.path().join("decoded.pclcap");
    generate_capture(&capture);

    let output = pclvid(&[
        "build",
        capture.to_str().unwrap(),
        "-o",
        archive.to_str().unwrap(),
        "--codec",
        "lz4",
    ]);
    assert!(output.status.success(), "build failed: {:?}", output);
    assert!(archive.exists());
    let text = stdout(&output);
    assert!(text.contains("Packets: 7 (1 skipped"), "{text}");
    assert!(text.contains("Streams: 3"), "{text}");

    let output = pclvid(&["info", archive.to_str().unwrap(), "--entries"]);
    assert!(output.status.success(), "info failed: {:?}", output);
    let text = stdout(&output);
    assert!(text.contains("Codec: lz4"), "{text}");
    assert!(text.contains("range_ch1.plz4"), "{text}");
    assert!(text.contains("Auxiliary: status"), "{text}");

    let output = pclvid(&["info", archive.to_str().unwrap(), "--json"]);
    assert!(output.status.success());
    let index: serde_json::Value = serde_json::from_slice(&output.stdout).expect("info --json is JSON");
    assert_eq!(index["num_scans"], 7);
    assert_eq!(index["byte_order"], "little");

    let output = pclvid(&[
        "read",
        archive.to_str().unwrap(),
        "-o",
        decoded.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "read failed: {:?}", output);
    assert!(stdout(&output).contains("Wrote 7 packets"));

    let output = pclvid(&[
        "compare",
        capture.to_str().unwrap(),
        decoded.to_str().unwrap(),
        "--exact",
    ]);
    assert!(output.status.success(), "compare failed: {:?}", output);
    assert!(stdout(&output).contains("Packets compared: 7"));
}

#[test]
fn test_default_output_path() {
    let dir = tempdir().expect("Failed to create temp dir");
    let capture = dir.path().join("lap.pclcap");
    generate_capture(&capture);

    let output = pclvid(&["build", capture.to_str().unwrap(), "--codec", "lz4", "-q", "4"]);
    assert!(output.status.success(), "build failed: {:?}", output);
    assert!(dir.path().join("lap.pclv").exists());
}

#[test]
fn test_non_empty_staging_fails() {
    let dir = tempdir().expect("Failed to create temp dir");
    let capture = dir.path().join("drive.pclcap");
    let staging = dir.path().join("staging");
    generate_capture(&capture);
    std::fs::create_dir_all(&staging).unwrap();
    std::fs::write(staging.join("old.png"), b"x").unwrap();

    let output = pclvid(&[
        "build",
        capture.to_str().unwrap(),
        "--codec",
        "lz4",
        "--staging",
        staging.to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not empty"));
    assert!(!dir.path().join("drive.pclv").exists());
}

#[test]
fn test_config_file_and_bad_quality() {
    let dir = tempdir().expect("Failed to create temp dir");
    let capture = dir.path().join("drive.pclcap");
    let config = dir.path().join("pclvid.toml");
    generate_capture(&capture);
    std::fs::write(&config, "codec = \"lz4\"\njobs = 1\n").unwrap();

    let output = pclvid(&["build", capture.to_str().unwrap(), "--config", config.to_str().unwrap()]);
    assert!(output.status.success(), "build failed: {:?}", output);
    assert!(stdout(&output).contains("Codec: lz4"));

    let output = pclvid(&[
        "build",
        capture.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "-q",
        "99",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_bench_sweep() {
    let dir = tempdir().expect("Failed to create temp dir");
    let capture = dir.path().join("drive.pclcap");
    let out_dir = dir.path().join("bench");
    generate_capture(&capture);

    let output = pclvid(&[
        "bench",
        capture.to_str().unwrap(),
        "--levels",
        "0,4",
        "--codec",
        "lz4",
        "--out-dir",
        out_dir.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "bench failed: {:?}", output);
    assert!(out_dir.join("q00.pclv").exists());
    assert!(out_dir.join("q04.pclv").exists());

    let text = stdout(&output);
    assert!(text.contains("range MAPE%"), "{text}");
    assert_eq!(text.lines().count(), 3, "{text}");
}

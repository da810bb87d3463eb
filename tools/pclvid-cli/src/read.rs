//! Read command - archive in, capture out

use anyhow::{Context, Result};
use clap::Args;
use pclvid_core::{ArchiveReader, CaptureHeader, CaptureWriter, EncoderConfig, Packet};
use pclvid_shared::PCLC_CAPTURE_FORMAT;
use std::path::PathBuf;

/// Arguments for the read command
#[derive(Args)]
pub struct ReadArgs {
    /// Input archive (.pclv)
    pub archive: PathBuf,

    /// Output capture (default: archive path with .pclcap extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// ffmpeg executable (default: $PCLVID_FFMPEG, then PATH)
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,
}

/// Execute the read command
pub fn execute(args: ReadArgs) -> Result<()> {
    let config = EncoderConfig {
        ffmpeg: args.ffmpeg,
        ..EncoderConfig::default()
    };
    let mut reader = ArchiveReader::open_with(&args.archive, config)
        .with_context(|| format!("Failed to open archive {}", args.archive.display()))?;

    let output = args
        .output
        .unwrap_or_else(|| args.archive.with_extension(PCLC_CAPTURE_FORMAT.extension));

    let header = CaptureHeader {
        field_types: reader.field_types().to_vec(),
        sensor_metadata: Some(String::from_utf8_lossy(reader.metadata()).into_owned()),
        packet_count: Some(reader.scans_num() as u64),
    };
    let mut writer = CaptureWriter::create(&output, &header)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    for packet in reader.packets()? {
        let packet = packet.with_context(|| format!("Failed to decode {}", args.archive.display()))?;
        writer.write_packet(&Packet::from(packet))?;
    }
    let written = writer.written();
    writer.finish()?;

    println!("Wrote {} packets to {}", written, output.display());
    Ok(())
}

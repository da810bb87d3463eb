//! Bench command - quality sweep
//!
//! Builds one archive per quality level from the same capture, reads each
//! back, and reports build time, archive size, compression ratio and
//! per-field MAPE against the capture.

use anyhow::{Context, Result};
use clap::Args;
use pclvid_core::fidelity::FidelityAccumulator;
use pclvid_core::{
    ArchiveReader, ArchiveWriter, BuildOptions, CaptureReader, EncoderConfig, FidelityReport, Packet, PacketSource,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::EncoderFlags;

/// Arguments for the bench command
#[derive(Args)]
pub struct BenchArgs {
    /// Input capture (.pclcap)
    pub capture: PathBuf,

    /// Quality levels to sweep
    #[arg(short, long, value_delimiter = ',', default_value = "0,4,10,25")]
    pub levels: Vec<u32>,

    /// Keep the archives in this directory (default: a temporary directory)
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    #[command(flatten)]
    pub encoder: EncoderFlags,
}

/// One row of the sweep.
struct BenchRow {
    quality: u32,
    seconds: f64,
    size: u64,
    mape: Vec<(String, f64)>,
}

/// Execute the bench command
pub fn execute(args: BenchArgs) -> Result<()> {
    let base = args.encoder.resolve()?;
    let capture_size = std::fs::metadata(&args.capture)
        .with_context(|| format!("Failed to read {}", args.capture.display()))?
        .len();

    let temp;
    let out_dir = match &args.out_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            dir.as_path()
        }
        None => {
            temp = tempfile::tempdir()?;
            temp.path()
        }
    };

    let mut rows = Vec::with_capacity(args.levels.len());
    for &quality in &args.levels {
        let mut config = base.clone();
        config.quality = quality;
        config.validate()?;

        let archive = out_dir.join(format!("q{quality:02}.pclv"));
        let mut source = CaptureReader::open(&args.capture)?;
        let start = Instant::now();
        let report = ArchiveWriter::new(BuildOptions {
            config: config.clone(),
            ..BuildOptions::default()
        })
        .build(&mut source, &archive)
        .with_context(|| format!("Build at quality {quality} failed"))?;
        let seconds = start.elapsed().as_secs_f64();

        let fidelity = measure(&args.capture, &archive, config)?;
        tracing::info!("Quality {}: {} bytes in {:.2}s", quality, report.archive_size, seconds);

        rows.push(BenchRow {
            quality,
            seconds,
            size: report.archive_size,
            mape: fidelity
                .fields
                .into_iter()
                .map(|(name, error)| (name, error.mape))
                .collect(),
        });
    }

    print_table(&rows, capture_size);
    Ok(())
}

/// Read `archive` back and compare it packet by packet with `capture`.
fn measure(capture: &Path, archive: &Path, config: EncoderConfig) -> Result<FidelityReport> {
    let mut original = CaptureReader::open(capture)?;
    let mut reader = ArchiveReader::open_with(archive, config)?;
    let mut acc = FidelityAccumulator::new();

    for decoded in reader.packets()? {
        let decoded = Packet::from(decoded?);
        let reference = loop {
            match original.next_packet()? {
                Some(packet) if packet.has_valid_timestamp() => break packet,
                Some(_) => continue,
                None => anyhow::bail!("{} has more packets than {}", archive.display(), capture.display()),
            }
        };
        acc.add(&reference, &decoded)?;
    }
    Ok(acc.finish())
}

fn print_table(rows: &[BenchRow], capture_size: u64) {
    let fields: Vec<&str> = rows
        .first()
        .map(|row| row.mape.iter().map(|(name, _)| name.as_str()).collect())
        .unwrap_or_default();

    print!("{:>8} {:>10} {:>14} {:>8}", "quality", "seconds", "bytes", "ratio");
    for field in &fields {
        print!(" {:>14}", format!("{field} MAPE%"));
    }
    println!();

    for row in rows {
        let ratio = capture_size as f64 / row.size.max(1) as f64;
        print!("{:>8} {:>10.3} {:>14} {:>8.2}", row.quality, row.seconds, row.size, ratio);
        for (_, mape) in &row.mape {
            print!(" {:>14.6}", mape);
        }
        println!();
    }
}

//! Build command - capture in, archive out

use anyhow::{Context, Result};
use clap::Args;
use pclvid_core::{ArchiveWriter, BuildOptions, CaptureReader, PclError};
use pclvid_shared::PCLV_ARCHIVE_FORMAT;
use pclvid_shared::fs::{MAX_METADATA_BYTES, read_file_with_limit};
use std::path::PathBuf;

use crate::config::EncoderFlags;

/// Arguments for the build command
#[derive(Args)]
pub struct BuildArgs {
    /// Input capture (.pclcap)
    pub capture: PathBuf,

    /// Output archive (default: capture path with .pclv extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Sensor metadata JSON (overrides the capture's own)
    #[arg(short, long)]
    pub metadata: Option<PathBuf>,

    /// Quality level: 0 = lossless, higher = smaller and lossier
    #[arg(short, long)]
    pub quality: Option<u32>,

    /// Staging directory (must be empty; kept after the build)
    #[arg(long)]
    pub staging: Option<PathBuf>,

    #[command(flatten)]
    pub encoder: EncoderFlags,
}

/// Execute the build command
pub fn execute(args: BuildArgs) -> Result<()> {
    let mut config = args.encoder.resolve()?;
    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    config.validate()?;

    let metadata = args
        .metadata
        .as_deref()
        .map(|path| read_file_with_limit(path, MAX_METADATA_BYTES))
        .transpose()?;

    let output = args
        .output
        .unwrap_or_else(|| args.capture.with_extension(PCLV_ARCHIVE_FORMAT.extension));

    let mut source = CaptureReader::open(&args.capture)
        .with_context(|| format!("Failed to open capture {}", args.capture.display()))?;

    let options = BuildOptions {
        config,
        staging: args.staging,
        metadata,
    };
    let report = match ArchiveWriter::new(options).build(&mut source, &output) {
        Ok(report) => report,
        Err(PclError::ZeroValidPackets) => {
            anyhow::bail!(
                "{} has no packets with a valid timestamp, nothing to archive",
                args.capture.display()
            )
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to build {}", output.display()));
        }
    };

    println!("Archive: {}", report.archive.display());
    println!("  Codec: {} (quality {})", report.codec, report.quality);
    println!(
        "  Packets: {} ({} skipped with invalid timestamps)",
        report.packets_accepted, report.packets_skipped
    );
    println!("  Frame rate: {:.4} fps", report.frame_rate);
    println!("  Streams: {}", report.streams.len());
    println!("  Size: {} bytes", report.archive_size);
    if let Some(staging) = &report.staging {
        println!("  Staging kept: {}", staging.display());
    }

    Ok(())
}

//! pclvid - compress sensor packet captures into byte-plane video archives
//!
//! # Commands
//!
//! - `pclvid build` - Encode a `.pclcap` capture into a `.pclv` archive
//! - `pclvid read` - Decode a `.pclv` archive back into a `.pclcap` capture
//! - `pclvid info` - Show an archive's index
//! - `pclvid compare` - Per-field error between two captures
//! - `pclvid bench` - Size / time / error sweep over quality levels
//!
//! # Usage
//!
//! ```bash
//! # Lossless archive (quality 0, ffmpeg + libx265)
//! pclvid build drive.pclcap -o drive.pclv
//!
//! # Lossy, with sensor metadata
//! pclvid build drive.pclcap -q 10 -m sensor.json
//!
//! # No ffmpeg available: built-in lossless codec
//! pclvid build drive.pclcap --codec lz4
//!
//! # Read back and check
//! pclvid read drive.pclv -o decoded.pclcap
//! pclvid compare drive.pclcap decoded.pclcap
//! ```

mod bench;
mod build;
mod compare;
mod config;
mod info;
mod read;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// pclvid - byte-plane video compression for sensor packet captures
#[derive(Parser)]
#[command(name = "pclvid")]
#[command(about = "Compress sensor packet captures into video archives")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a capture into an archive
    Build(build::BuildArgs),

    /// Decode an archive back into a capture
    Read(read::ReadArgs),

    /// Show archive index and entries
    Info(info::InfoArgs),

    /// Report per-field error between two captures
    Compare(compare::CompareArgs),

    /// Build archives across quality levels and report size, time and error
    Bench(bench::BenchArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => build::execute(args),
        Commands::Read(args) => read::execute(args),
        Commands::Info(args) => info::execute(args),
        Commands::Compare(args) => compare::execute(args),
        Commands::Bench(args) => bench::execute(args),
    }
}

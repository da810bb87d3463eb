//! Compare command - per-field error between two captures

use anyhow::{Context, Result};
use clap::Args;
use pclvid_core::{CaptureReader, FidelityReport, compare};
use std::path::PathBuf;

/// Arguments for the compare command
#[derive(Args)]
pub struct CompareArgs {
    /// Reference capture
    pub original: PathBuf,

    /// Capture to check against the reference
    pub decoded: PathBuf,

    /// Fail unless every field matches bit-exactly
    #[arg(long)]
    pub exact: bool,
}

/// Execute the compare command
pub fn execute(args: CompareArgs) -> Result<()> {
    let mut original = CaptureReader::open(&args.original)
        .with_context(|| format!("Failed to open {}", args.original.display()))?;
    let mut decoded = CaptureReader::open(&args.decoded)
        .with_context(|| format!("Failed to open {}", args.decoded.display()))?;

    let report = compare(&mut original, &mut decoded)?;
    print_report(&report);

    if args.exact && !report.is_exact() {
        anyhow::bail!("captures differ");
    }
    Ok(())
}

pub fn print_report(report: &FidelityReport) {
    println!("Packets compared: {}", report.packets);
    println!("  {:<20} {:>14} {:>12}", "field", "MAE", "MAPE %");
    for (name, error) in &report.fields {
        println!("  {:<20} {:>14.6} {:>12.6}", name, error.mae, error.mape);
    }
}

//! Info command - print an archive's index

use anyhow::{Context, Result};
use clap::Args;
use pclvid_core::ArchiveReader;
use pclvid_core::archive::container::ContainerReader;
use std::path::PathBuf;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Archive to inspect (.pclv)
    pub archive: PathBuf,

    /// Print the raw index as JSON
    #[arg(long)]
    pub json: bool,

    /// List every container entry with its size
    #[arg(long)]
    pub entries: bool,
}

/// Execute the info command
pub fn execute(args: InfoArgs) -> Result<()> {
    let reader = ArchiveReader::open(&args.archive)
        .with_context(|| format!("Failed to open archive {}", args.archive.display()))?;
    let index = reader.index();

    if args.json {
        println!("{}", serde_json::to_string_pretty(index)?);
        return Ok(());
    }

    println!("Archive: {}", args.archive.display());
    println!("  Format version: {} ({} endian planes)", index.format_version, index.byte_order);
    println!("  Codec: {} (quality {})", index.codec, index.quality);
    println!("  Scans: {}", index.num_scans);
    println!("  Frame rate: {:.4} fps", index.frame_rate);
    println!("  Created: {} by pclvid {}", index.created_at.to_rfc3339(), index.tool_version);
    println!();
    println!("Fields:");
    for field in &index.field_types {
        let shape = index.shape(&field.name).unwrap_or(&[]);
        let channels = index.fields_to_channels.get(&field.name).map_or(0, Vec::len);
        println!(
            "  {:<20} {:<4} shape {:?}, {} channel(s)",
            field.name,
            field.element_type.name(),
            shape,
            channels
        );
    }

    if !index.aux_kinds.is_empty() {
        println!();
        println!("Auxiliary: {}", index.aux_kinds.join(", "));
    }

    if args.entries {
        let container = ContainerReader::open(&args.archive)?;
        println!();
        println!("Entries:");
        for name in container.names() {
            let len = container.location(name).map_or(0, |loc| loc.len);
            println!("  {:<32} {:>12} bytes", name, len);
        }
    }

    Ok(())
}

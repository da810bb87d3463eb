//! Encoder flags shared by `build` and `bench`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pclvid_core::{CodecKind, EncoderConfig};

/// Encoder settings; flags override the config file.
#[derive(Args, Debug, Clone)]
pub struct EncoderFlags {
    /// TOML encoder config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Channel codec (ffmpeg, lz4)
    #[arg(long)]
    pub codec: Option<CodecKind>,

    /// ffmpeg executable (default: $PCLVID_FFMPEG, then PATH)
    #[arg(long)]
    pub ffmpeg: Option<PathBuf>,

    /// x265 preset
    #[arg(long)]
    pub preset: Option<String>,

    /// Concurrent channel encodes
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl EncoderFlags {
    pub fn resolve(&self) -> Result<EncoderConfig> {
        let mut config = match &self.config {
            Some(path) => EncoderConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => EncoderConfig::default(),
        };

        if let Some(codec) = self.codec {
            config.codec = codec;
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.ffmpeg = Some(ffmpeg.clone());
        }
        if let Some(preset) = &self.preset {
            config.preset = preset.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = Some(jobs);
        }

        config.validate()?;
        Ok(config)
    }
}

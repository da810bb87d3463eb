//! Encoder configuration.
//!
//! Loaded from a TOML file when the caller has one; every key is optional.
//!
//! ```toml
//! quality = 0            # 0 = lossless
//! codec = "ffmpeg"       # or "lz4"
//! ffmpeg = "/usr/bin/ffmpeg"
//! preset = "ultrafast"
//! jobs = 4
//! fallback_frame_rate = 10.0
//! ```

use std::path::{Path, PathBuf};

use pclvid_shared::fs::{MAX_CONFIG_BYTES, read_file_with_limit};
use serde::{Deserialize, Serialize};

use crate::codec::{CodecKind, LOSSLESS_QUALITY};
use crate::error::{PclError, Result};

/// Frame rate used when the capture timing cannot produce one.
pub const DEFAULT_FALLBACK_FRAME_RATE: f64 = 10.0;

/// Largest quality level accepted by the encoders (x265 `-qp` range).
pub const MAX_QUALITY: u32 = 51;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Quality level passed to the codec (0 = lossless)
    pub quality: u32,

    /// Codec used for channel streams
    pub codec: CodecKind,

    /// Explicit ffmpeg executable (otherwise env var, then PATH)
    pub ffmpeg: Option<PathBuf>,

    /// x265 speed preset
    pub preset: String,

    /// Concurrent channel encodes (None = available parallelism)
    pub jobs: Option<usize>,

    /// Frame rate used when capture timing is degenerate
    pub fallback_frame_rate: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: LOSSLESS_QUALITY,
            codec: CodecKind::default(),
            ffmpeg: None,
            preset: "ultrafast".to_string(),
            jobs: None,
            fallback_frame_rate: DEFAULT_FALLBACK_FRAME_RATE,
        }
    }
}

impl EncoderConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PclError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file of at most [`MAX_CONFIG_BYTES`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = read_file_with_limit(path, MAX_CONFIG_BYTES).map_err(|e| PclError::Config(format!("{e:#}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| PclError::Config(format!("{} is not UTF-8", path.display())))?;
        Self::from_toml(&text)
            .map_err(|e| PclError::Config(format!("{}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        if self.quality > MAX_QUALITY {
            return Err(PclError::Config(format!(
                "quality {} is out of range (0-{MAX_QUALITY})",
                self.quality
            )));
        }
        if self.jobs == Some(0) {
            return Err(PclError::Config("jobs must be at least 1".to_string()));
        }
        if !(self.fallback_frame_rate.is_finite() && self.fallback_frame_rate > 0.0) {
            return Err(PclError::Config(format!(
                "fallback_frame_rate must be positive, got {}",
                self.fallback_frame_rate
            )));
        }
        if self.preset.is_empty() {
            return Err(PclError::Config("preset cannot be empty".to_string()));
        }
        Ok(())
    }
}

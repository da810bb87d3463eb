//! Channel codec adapters: byte-plane frame sequences to compressed streams.
//!
//! A [`VideoCodec`] turns the staged frames of one (field, channel) into a
//! single stream file, and a stream file back into a lazy [`FrameStream`].
//!
//! | Codec | Stream | Quality 0 | Quality > 0 |
//! |-------|--------|-----------|-------------|
//! | [`FfmpegCodec`] | `.mp4` (libx265, gray) | lossless (`lossless=1`) | lossy, `-qp <quality>` |
//! | [`Lz4FrameCodec`] | `.plz4` | lossless | lossless (level ignored) |
//!
//! Only quality 0 carries a bit-exact round-trip guarantee.

mod ffmpeg;
mod frames;
mod lz4;

pub use ffmpeg::{FFMPEG_ENV_VAR, FfmpegCodec, locate_ffmpeg};
pub use frames::FrameSequence;
pub use lz4::Lz4FrameCodec;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EncoderConfig;
use crate::error::{PclError, Result};
use crate::planes::Plane;

/// Lossless quality level (the default).
pub const LOSSLESS_QUALITY: u32 = 0;

/// Lazy, forward-only, finite sequence of decoded frames.
pub type FrameStream = Box<dyn Iterator<Item = Result<Plane>> + Send>;

/// Encoder/decoder for one channel's frame sequence.
pub trait VideoCodec: Send + Sync {
    /// Identifier stored in the archive index.
    fn id(&self) -> &'static str;

    /// Extension of stream entries produced by this codec.
    fn stream_extension(&self) -> &'static str;

    /// Encode an ordered frame sequence into `output`.
    fn encode(&self, frames: &FrameSequence, frame_rate: f64, quality: u32, output: &Path) -> Result<()>;

    /// Open a stream for lazy decoding. Frames must be `width` x `height`.
    fn decode(&self, stream: &Path, width: u32, height: u32) -> Result<FrameStream>;
}

/// Codec selection, as written in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// External ffmpeg with libx265
    #[default]
    Ffmpeg,
    /// Built-in lossless LZ4 frame stream
    Lz4,
}

impl CodecKind {
    /// Identifier stored in the archive index.
    pub const fn id(self) -> &'static str {
        match self {
            CodecKind::Ffmpeg => FfmpegCodec::ID,
            CodecKind::Lz4 => Lz4FrameCodec::ID,
        }
    }

    /// Extension of the stream entries this codec writes.
    pub const fn stream_extension(self) -> &'static str {
        match self {
            CodecKind::Ffmpeg => FfmpegCodec::EXTENSION,
            CodecKind::Lz4 => Lz4FrameCodec::EXTENSION,
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            FfmpegCodec::ID => Some(CodecKind::Ffmpeg),
            Lz4FrameCodec::ID => Some(CodecKind::Lz4),
            _ => None,
        }
    }
}

impl std::str::FromStr for CodecKind {
    type Err = PclError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ffmpeg" | "x265" | "libx265" => Ok(CodecKind::Ffmpeg),
            "lz4" => Ok(CodecKind::Lz4),
            other => Err(PclError::Config(format!(
                "unknown codec '{other}' (use 'ffmpeg' or 'lz4')"
            ))),
        }
    }
}

/// Instantiate the codec for `kind` using the encoder configuration.
pub fn codec_for(kind: CodecKind, config: &EncoderConfig) -> Result<Arc<dyn VideoCodec>> {
    Ok(match kind {
        CodecKind::Ffmpeg => {
            let executable = locate_ffmpeg(config.ffmpeg.as_deref())?;
            Arc::new(FfmpegCodec::new(executable).with_preset(config.preset.clone()))
        }
        CodecKind::Lz4 => Arc::new(Lz4FrameCodec),
    })
}

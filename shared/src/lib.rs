//! Shared constants and helpers for the pclvid tools.
//!
//! Everything that both the core library and the CLI need to agree on lives
//! here: file extensions, magic bytes, entry names and format versions.

pub mod archive_format;
pub mod fs;

pub use archive_format::{ArchiveFormat, CaptureFormat, PCLV_ARCHIVE_FORMAT, PCLC_CAPTURE_FORMAT};

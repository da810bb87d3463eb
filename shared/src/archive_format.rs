//! Container format descriptors for pclvid archives and captures.
//!
//! This module is the single source of truth for all on-disk constants
//! (file extensions, magic bytes, well-known entry names, versions).
//!
//! # Example
//!
//! ```
//! use pclvid_shared::PCLV_ARCHIVE_FORMAT;
//!
//! assert_eq!(PCLV_ARCHIVE_FORMAT.extension, "pclv");
//! assert_eq!(PCLV_ARCHIVE_FORMAT.magic, b"PCLV");
//! assert_eq!(PCLV_ARCHIVE_FORMAT.channel_entry("range", 1, "mp4"), "range_ch1.mp4");
//! ```

/// Archive format descriptor.
///
/// Entry names are part of the compatibility surface: readers look streams
/// up by the names produced here.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveFormat {
    /// Archive file extension without dot
    pub extension: &'static str,

    /// Magic bytes at start of the archive (4 bytes)
    pub magic: &'static [u8; 4],

    /// Container version written by this build
    pub version: u32,

    /// Entry holding the serialized archive index
    pub index_entry: &'static str,

    /// Entry holding the sensor metadata blob
    pub metadata_entry: &'static str,

    /// Directory prefix for auxiliary array blobs
    pub aux_prefix: &'static str,

    /// Byte order of channel planes (channel 0 = least significant byte)
    pub byte_order: &'static str,
}

impl ArchiveFormat {
    /// Entry name of one (field, channel) stream.
    pub fn channel_entry(&self, field: &str, channel: u8, stream_ext: &str) -> String {
        format!("{field}_ch{channel}.{stream_ext}")
    }

    /// Entry name of one auxiliary array kind.
    pub fn aux_entry(&self, kind: &str) -> String {
        format!("{}/{kind}.bin", self.aux_prefix)
    }
}

/// Capture file descriptor (packet streams before compression).
#[derive(Debug, Clone, Copy)]
pub struct CaptureFormat {
    /// Capture file extension without dot
    pub extension: &'static str,

    /// Magic bytes at start of the capture (4 bytes)
    pub magic: &'static [u8; 4],

    /// Format version for backward compatibility
    pub version: u32,
}

/// pclvid archive format.
///
/// - Extension: `.pclv`
/// - Magic bytes: `PCLV`
/// - Version: `1` (little-endian byte planes)
pub const PCLV_ARCHIVE_FORMAT: ArchiveFormat = ArchiveFormat {
    extension: "pclv",
    magic: b"PCLV",
    version: 1,
    index_entry: "_pcl_video_index.json",
    metadata_entry: "metadata.json",
    aux_prefix: "aux",
    byte_order: "little",
};

/// pclvid capture format (`.pclcap`).
pub const PCLC_CAPTURE_FORMAT: CaptureFormat = CaptureFormat {
    extension: "pclcap",
    magic: b"PCLC",
    version: 1,
};

//! The `.pclv` archive: channel streams, auxiliary blobs, sensor metadata and
//! the index that binds them back to typed fields.
//!
//! ```text
//! range_ch0.mp4          channel 0 (least significant byte) of field "range"
//! range_ch1.mp4
//! ...
//! metadata.json          sensor metadata, `{}` if the source had none
//! aux/status.bin         one blob per auxiliary kind
//! _pcl_video_index.json  ArchiveIndex
//! ```
//!
//! Entries are framed by [`container`]; see there for the byte layout.

pub mod container;
mod index;
mod reader;
mod writer;

pub use index::{ArchiveIndex, ChannelLayout};
pub use reader::ArchiveReader;
pub use writer::{ArchiveWriter, BuildOptions, BuildReport};

//! pclvid core - byte-plane video compression for sensor packet streams
//!
//! Typed raster fields (lidar range, signal, reflectivity, ...) are split
//! into 8-bit byte planes, each plane sequence is handed to a video codec,
//! and the resulting streams are bundled into one `.pclv` archive together
//! with an index that maps them back to fields, element types and shapes.
//!
//! # Architecture
//!
//! - [`planes`] - [`decompose`]/[`recompose`] between a [`FieldArray`] and its byte planes
//! - [`FrameSequencer`] - assigns each packet's planes to per-channel frame sequences
//! - [`VideoCodec`] - channel stream encoder/decoder ([`FfmpegCodec`], [`Lz4FrameCodec`])
//! - [`ArchiveWriter`] / [`ArchiveReader`] - the `.pclv` container
//! - [`ReconstructionIterator`] - lockstep decode back into packets
//!
//! # Example
//!
//! ```no_run
//! use pclvid_core::{ArchiveReader, ArchiveWriter, BuildOptions, CaptureReader};
//! use std::path::Path;
//!
//! # fn main() -> pclvid_core::Result<()> {
//! let mut source = CaptureReader::open(Path::new("drive.pclcap"))?;
//! let report = ArchiveWriter::new(BuildOptions::default()).build(&mut source, Path::new("drive.pclv"))?;
//! println!("{} packets at {:.2} fps", report.packets_accepted, report.frame_rate);
//!
//! let mut reader = ArchiveReader::open(Path::new("drive.pclv"))?;
//! for packet in reader.packets()? {
//!     let packet = packet?;
//!     println!("{} {:?}", packet.timestamp, packet.fields.keys().collect::<Vec<_>>());
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod capture;
pub mod codec;
pub mod config;
pub mod encoding;
pub mod error;
pub mod fidelity;
pub mod field;
pub mod packet;
pub mod planes;
pub mod reconstruct;
pub mod sequencer;
pub mod staging;

pub use archive::{ArchiveIndex, ArchiveReader, ArchiveWriter, BuildOptions, BuildReport, ChannelLayout};
pub use capture::{CaptureHeader, CaptureReader, CaptureWriter, write_capture};
pub use codec::{CodecKind, FfmpegCodec, FrameSequence, FrameStream, LOSSLESS_QUALITY, Lz4FrameCodec, VideoCodec};
pub use config::EncoderConfig;
pub use encoding::{AuxBlob, AuxRecord};
pub use error::{PclError, Result};
pub use fidelity::{FidelityReport, FieldError, compare};
pub use field::{Element, ElementType, FieldArray, FieldClass, FieldType};
pub use packet::{INVALID_TIMESTAMP, MemorySource, Packet, PacketSource};
pub use planes::{Plane, decompose, recompose};
pub use reconstruct::{Lockstep, ReconstructedPacket, ReconstructionIterator};
pub use sequencer::{FrameSequencer, Sequenced, SequencedCapture};
pub use staging::Staging;

//! Sensor packets and the packet source seam.
//!
//! Parsing raw sensor traffic is not this crate's job: anything that can hand
//! out [`Packet`]s in capture order implements [`PacketSource`]. Two sources
//! ship with the crate, [`MemorySource`] and the `.pclcap` reader in
//! [`crate::capture`].

use std::collections::BTreeMap;

use crate::error::Result;
use crate::field::{FieldArray, FieldType};

/// Timestamp value marking a packet without a valid synchronization time.
pub const INVALID_TIMESTAMP: u64 = 0;

/// One sensor packet (or scan): raster fields plus auxiliary arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    /// Synchronization timestamp in nanoseconds ([`INVALID_TIMESTAMP`] if unknown)
    pub timestamp: u64,

    /// Raster fields, keyed by field name
    pub fields: BTreeMap<String, FieldArray>,

    /// Auxiliary per-packet arrays (status, alert_flags, pose, ...)
    pub aux: BTreeMap<String, FieldArray>,
}

impl Packet {
    pub fn new(timestamp: u64) -> Self {
        Self {
            timestamp,
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, array: FieldArray) -> Self {
        self.fields.insert(name.into(), array);
        self
    }

    pub fn with_aux(mut self, kind: impl Into<String>, array: FieldArray) -> Self {
        self.aux.insert(kind.into(), array);
        self
    }

    pub fn has_valid_timestamp(&self) -> bool {
        self.timestamp != INVALID_TIMESTAMP
    }
}

/// A forward-only stream of packets with a static field declaration.
pub trait PacketSource {
    /// Declared fields, in the order they should appear in the archive.
    fn field_types(&self) -> &[FieldType];

    /// Estimated packet count, for progress reporting only.
    fn scans_hint(&self) -> Option<usize> {
        None
    }

    /// Sensor description (JSON) to embed in the archive, if the source has one.
    fn sensor_metadata(&self) -> Option<&[u8]> {
        None
    }

    /// Next packet in capture order, `None` at the end.
    fn next_packet(&mut self) -> Result<Option<Packet>>;
}

/// In-memory packet source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    field_types: Vec<FieldType>,
    packets: std::collections::VecDeque<Packet>,
    total: usize,
    metadata: Option<Vec<u8>>,
}

impl MemorySource {
    pub fn new(field_types: Vec<FieldType>, packets: Vec<Packet>) -> Self {
        Self {
            field_types,
            total: packets.len(),
            packets: packets.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: impl Into<Vec<u8>>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

impl PacketSource for MemorySource {
    fn field_types(&self) -> &[FieldType] {
        &self.field_types
    }

    fn scans_hint(&self) -> Option<usize> {
        Some(self.total)
    }

    fn sensor_metadata(&self) -> Option<&[u8]> {
        self.metadata.as_deref()
    }

    fn next_packet(&mut self) -> Result<Option<Packet>> {
        Ok(self.packets.pop_front())
    }
}

//! Frame sequencing: packets in, per-channel frame sequences out.
//!
//! Every accepted packet contributes exactly one frame to every
//! (field, channel) sequence, so all channels share one frame count equal to
//! the number of accepted packets. Packets carrying the invalid timestamp are
//! skipped without aborting the run.

use std::collections::BTreeMap;

use crate::codec::FrameSequence;
use crate::encoding::{AuxBlob, AuxRecord};
use crate::error::{PclError, Result};
use crate::field::FieldType;
use crate::packet::Packet;
use crate::planes::{decompose, plane_dims};
use crate::staging::Staging;

/// Timestamp span divisor of the nominal frame rate formula.
pub const FRAME_RATE_TIME_DIVISOR: f64 = 1e7;

/// Outcome of [`FrameSequencer::push`].
#[derive(Debug)]
pub enum Sequenced {
    /// Packet became frame `n` of every channel
    Accepted(usize),
    /// Packet was skipped; carries the non-fatal reason
    Skipped(PclError),
}

/// Frames of one (field, channel).
#[derive(Debug, Clone)]
pub struct ChannelFrames {
    pub field: String,
    pub channel: u8,
    pub frames: FrameSequence,
}

/// Everything the sequencer collected, ready for encoding.
#[derive(Debug)]
pub struct SequencedCapture {
    pub field_types: Vec<FieldType>,

    /// Shape of every field, fixed by the first accepted packet
    pub shapes: BTreeMap<String, Vec<usize>>,

    /// Channel sequences, in field declaration order then channel order
    pub channels: Vec<ChannelFrames>,

    pub aux: BTreeMap<String, AuxBlob>,

    /// Packet timestamp of every frame
    pub frame_timestamps: Vec<u64>,

    pub frame_rate: f64,

    /// Packets skipped for an invalid timestamp
    pub skipped: usize,
}

/// Check that a field name can be used as a staging directory and entry name.
pub fn validate_field_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && name.len() <= 200;
    if valid {
        Ok(())
    } else {
        Err(PclError::CorruptLayout(format!("invalid field name {name:?}")))
    }
}

/// Nominal frame rate of a capture: `(max - min) / 1e7 / count`.
///
/// Returns `None` for zero packets, and for spans that do not produce a
/// positive finite rate.
pub fn nominal_frame_rate(min_ts: u64, max_ts: u64, count: usize) -> Option<f64> {
    if count == 0 {
        return None;
    }
    let rate = max_ts.saturating_sub(min_ts) as f64 / FRAME_RATE_TIME_DIVISOR / count as f64;
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

pub struct FrameSequencer<'a> {
    staging: &'a Staging,
    field_types: Vec<FieldType>,
    shapes: BTreeMap<String, Vec<usize>>,
    channels: Vec<ChannelFrames>,
    aux: BTreeMap<String, AuxBlob>,
    frame_timestamps: Vec<u64>,
    min_ts: u64,
    max_ts: u64,
    seen: usize,
    skipped: usize,
    fallback_frame_rate: f64,
}

impl<'a> FrameSequencer<'a> {
    pub fn new(field_types: Vec<FieldType>, staging: &'a Staging, fallback_frame_rate: f64) -> Result<Self> {
        if field_types.is_empty() {
            return Err(PclError::CorruptLayout("source declares no fields".to_string()));
        }
        for (i, field) in field_types.iter().enumerate() {
            validate_field_name(&field.name)?;
            if field_types[..i].iter().any(|other| other.name == field.name) {
                return Err(PclError::CorruptLayout(format!(
                    "field '{}' is declared twice",
                    field.name
                )));
            }
        }

        Ok(Self {
            staging,
            field_types,
            shapes: BTreeMap::new(),
            channels: Vec::new(),
            aux: BTreeMap::new(),
            frame_timestamps: Vec::new(),
            min_ts: u64::MAX,
            max_ts: 0,
            seen: 0,
            skipped: 0,
            fallback_frame_rate,
        })
    }

    /// Append one packet's planes to every channel sequence.
    pub fn push(&mut self, packet: &Packet) -> Result<Sequenced> {
        let index = self.seen;
        self.seen += 1;

        if !packet.has_valid_timestamp() {
            self.skipped += 1;
            let reason = PclError::InvalidTimestamp { index };
            tracing::warn!("Skipping packet: {}", reason);
            return Ok(Sequenced::Skipped(reason));
        }

        if self.frame_timestamps.is_empty() {
            self.start_sequences(packet)?;
        }

        // Channel sequences are laid out field by field, channels ascending
        let mut next_channel = 0;
        for field in &self.field_types {
            let array = packet.fields.get(&field.name).ok_or_else(|| {
                PclError::ConsistencyError(format!(
                    "packet {index} is missing declared field '{}'",
                    field.name
                ))
            })?;

            if array.element_type() != field.element_type {
                return Err(PclError::CorruptLayout(format!(
                    "field '{}' declared as {} but packet {index} carries {}",
                    field.name,
                    field.element_type,
                    array.element_type()
                )));
            }
            if self.shapes.get(&field.name).map(Vec::as_slice) != Some(array.shape()) {
                return Err(PclError::CorruptLayout(format!(
                    "field '{}' changed shape to {:?} at packet {index}",
                    field.name,
                    array.shape()
                )));
            }

            for plane in decompose(array)? {
                self.channels[next_channel].frames.push(plane)?;
                next_channel += 1;
            }
        }

        let frame = self.frame_timestamps.len();
        for (kind, array) in &packet.aux {
            self.aux
                .entry(kind.clone())
                .or_default()
                .records
                .push(AuxRecord::new(frame as u64, packet.timestamp, array.clone()));
        }

        self.min_ts = self.min_ts.min(packet.timestamp);
        self.max_ts = self.max_ts.max(packet.timestamp);
        self.frame_timestamps.push(packet.timestamp);
        Ok(Sequenced::Accepted(frame))
    }

    /// Create one frame sequence per (field, channel) from the first accepted packet.
    fn start_sequences(&mut self, packet: &Packet) -> Result<()> {
        for field in &self.field_types {
            let array = packet.fields.get(&field.name).ok_or_else(|| {
                PclError::ConsistencyError(format!(
                    "first valid packet is missing declared field '{}'",
                    field.name
                ))
            })?;
            let (width, height) = plane_dims(array.shape())?;
            if width == 0 || height == 0 {
                return Err(PclError::CorruptLayout(format!(
                    "field '{}' has an empty raster {:?}",
                    field.name,
                    array.shape()
                )));
            }
            self.shapes.insert(field.name.clone(), array.shape().to_vec());

            for channel in 0..field.channel_count() as u8 {
                let stream = format!("{}_ch{channel}", field.name);
                let dir = self.staging.frames_dir(&field.name, channel);
                self.channels.push(ChannelFrames {
                    field: field.name.clone(),
                    channel,
                    frames: FrameSequence::create(stream, dir, width, height)?,
                });
            }
        }

        tracing::debug!(
            "Sequencing {} fields into {} channel streams",
            self.field_types.len(),
            self.channels.len()
        );
        Ok(())
    }

    /// Packets accepted so far.
    pub fn accepted(&self) -> usize {
        self.frame_timestamps.len()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Close the sequences and compute the nominal frame rate.
    pub fn finish(self) -> Result<SequencedCapture> {
        let count = self.frame_timestamps.len();
        if count == 0 {
            return Err(PclError::ZeroValidPackets);
        }

        let frame_rate = match nominal_frame_rate(self.min_ts, self.max_ts, count) {
            Some(rate) => rate,
            None => {
                tracing::warn!(
                    "Capture timing gives no usable frame rate, using {} fps",
                    self.fallback_frame_rate
                );
                self.fallback_frame_rate
            }
        };
        tracing::info!("FPS: {:.4} over {} packets", frame_rate, count);

        Ok(SequencedCapture {
            field_types: self.field_types,
            shapes: self.shapes,
            channels: self.channels,
            aux: self.aux,
            frame_timestamps: self.frame_timestamps,
            frame_rate,
            skipped: self.skipped,
        })
    }
}

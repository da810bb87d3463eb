//! The archive index (`_pcl_video_index.json`).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use pclvid_shared::PCLV_ARCHIVE_FORMAT;
use serde::{Deserialize, Serialize};

use crate::codec::CodecKind;
use crate::error::{PclError, Result};
use crate::field::{ElementType, FieldType};
use crate::planes::plane_dims;
use crate::sequencer::{SequencedCapture, validate_field_name};

/// One channel stream of a field. Channel planes are always 8-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub channel: u8,
    pub element_type: ElementType,
}

/// Versioned schema record binding channel streams back to typed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveIndex {
    pub format_version: u32,
    pub byte_order: String,

    /// Codec identifier (`ffmpeg-libx265`, `lz4`)
    pub codec: String,
    pub stream_extension: String,
    pub quality: u32,

    /// Nominal playback rate of the channel streams
    pub frame_rate: f64,

    /// Accepted packet count; every channel stream holds this many frames
    pub num_scans: usize,

    pub field_types: Vec<FieldType>,

    /// Array shape of every field
    pub field_shapes: BTreeMap<String, Vec<usize>>,

    pub fields_to_channels: BTreeMap<String, Vec<ChannelLayout>>,

    /// Packet timestamp of each frame
    pub frame_timestamps: Vec<u64>,

    #[serde(default)]
    pub aux_kinds: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub tool_version: String,
}

impl ArchiveIndex {
    /// Describe a sequenced capture encoded with `codec` at `quality`.
    pub fn describe(capture: &SequencedCapture, codec: &str, stream_extension: &str, quality: u32) -> Self {
        let fields_to_channels = capture
            .field_types
            .iter()
            .map(|field| (field.name.clone(), channel_layout(field.element_type)))
            .collect();

        Self {
            format_version: PCLV_ARCHIVE_FORMAT.version,
            byte_order: PCLV_ARCHIVE_FORMAT.byte_order.to_string(),
            codec: codec.to_string(),
            stream_extension: stream_extension.to_string(),
            quality,
            frame_rate: capture.frame_rate,
            num_scans: capture.frame_timestamps.len(),
            field_types: capture.field_types.clone(),
            field_shapes: capture.shapes.clone(),
            fields_to_channels,
            frame_timestamps: capture.frame_timestamps.clone(),
            aux_kinds: capture.aux.keys().cloned().collect(),
            created_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let index: Self = serde_json::from_slice(bytes)?;
        index.validate()?;
        Ok(index)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Check the index against itself: version, byte order, and that every
    /// field's channel list matches its element width.
    pub fn validate(&self) -> Result<()> {
        if self.format_version == 0 {
            return Err(PclError::InvalidArchive("index format_version 0".to_string()));
        }
        if self.format_version > PCLV_ARCHIVE_FORMAT.version {
            return Err(PclError::UnsupportedVersion {
                found: self.format_version,
                supported: PCLV_ARCHIVE_FORMAT.version,
            });
        }
        if self.byte_order != PCLV_ARCHIVE_FORMAT.byte_order {
            return Err(PclError::InvalidArchive(format!(
                "unsupported byte order '{}'",
                self.byte_order
            )));
        }
        if CodecKind::from_id(&self.codec).is_none() {
            return Err(PclError::InvalidArchive(format!("unknown codec '{}'", self.codec)));
        }
        if self.num_scans == 0 {
            return Err(PclError::InvalidArchive("archive holds no packets".to_string()));
        }
        if self.frame_timestamps.len() != self.num_scans {
            return Err(PclError::ConsistencyError(format!(
                "index lists {} frame timestamps for {} scans",
                self.frame_timestamps.len(),
                self.num_scans
            )));
        }

        if self.field_types.is_empty() {
            return Err(PclError::CorruptLayout("index declares no fields".to_string()));
        }

        for field in &self.field_types {
            validate_field_name(&field.name)?;

            let layout = self.fields_to_channels.get(&field.name).ok_or_else(|| {
                PclError::CorruptLayout(format!("field '{}' has no channel layout", field.name))
            })?;
            if *layout != channel_layout(field.element_type) {
                return Err(PclError::CorruptLayout(format!(
                    "field '{}' ({}) lists {} channels, expected {}",
                    field.name,
                    field.element_type,
                    layout.len(),
                    field.element_type.byte_width()
                )));
            }

            let shape = self.field_shapes.get(&field.name).ok_or_else(|| {
                PclError::CorruptLayout(format!("field '{}' has no shape", field.name))
            })?;
            plane_dims(shape)?;
        }

        if self.fields_to_channels.len() != self.field_types.len()
            || self.field_shapes.len() != self.field_types.len()
        {
            return Err(PclError::CorruptLayout(
                "channel layout names fields that are not declared".to_string(),
            ));
        }
        Ok(())
    }

    pub fn codec_kind(&self) -> Option<CodecKind> {
        CodecKind::from_id(&self.codec)
    }

    /// Archive entry name of one (field, channel) stream.
    pub fn channel_entry(&self, field: &str, channel: u8) -> String {
        PCLV_ARCHIVE_FORMAT.channel_entry(field, channel, &self.stream_extension)
    }

    /// Every channel stream, in field declaration order then channel order.
    pub fn channel_entries(&self) -> Vec<(&FieldType, u8, String)> {
        self.field_types
            .iter()
            .flat_map(|field| {
                self.fields_to_channels
                    .get(&field.name)
                    .into_iter()
                    .flatten()
                    .map(move |layout| (field, layout.channel, self.channel_entry(&field.name, layout.channel)))
            })
            .collect()
    }

    pub fn shape(&self, field: &str) -> Option<&[usize]> {
        self.field_shapes.get(field).map(Vec::as_slice)
    }
}

/// Channels 0..byte_width, each an 8-bit plane.
fn channel_layout(element_type: ElementType) -> Vec<ChannelLayout> {
    (0..element_type.byte_width() as u8)
        .map(|channel| ChannelLayout {
            channel,
            element_type: ElementType::U8,
        })
        .collect()
}

//! Archive reads: open, inspect, and iterate reconstructed packets.

use std::path::Path;
use std::sync::Arc;

use pclvid_shared::PCLV_ARCHIVE_FORMAT;
use pclvid_shared::fs::MAX_METADATA_BYTES;

use super::container::ContainerReader;
use super::index::ArchiveIndex;
use crate::codec::{FrameStream, codec_for};
use crate::config::EncoderConfig;
use crate::encoding::AuxBlob;
use crate::error::{PclError, Result};
use crate::field::FieldType;
use crate::planes::plane_dims;
use crate::reconstruct::{FieldPlan, ReconstructionIterator};
use crate::staging::Staging;

/// Largest auxiliary blob loaded into memory.
const MAX_AUX_BYTES: u64 = 1 << 30;

/// An opened `.pclv` archive.
///
/// Opening reads only the entry table, the index and the sensor metadata.
/// Channel streams are extracted on the first call to
/// [`ArchiveReader::packets`] and decoded lazily while iterating.
pub struct ArchiveReader {
    container: ContainerReader,
    index: ArchiveIndex,
    metadata: Vec<u8>,
    config: EncoderConfig,
    extracted: Option<Arc<Staging>>,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, EncoderConfig::default())
    }

    /// Open with an explicit configuration (ffmpeg location for decoding).
    pub fn open_with(path: &Path, config: EncoderConfig) -> Result<Self> {
        let container = ContainerReader::open(path)?;

        let index = ArchiveIndex::from_json(&container.read(PCLV_ARCHIVE_FORMAT.index_entry, MAX_METADATA_BYTES)?)?;
        let expected_ext = index.codec_kind().map(|kind| kind.stream_extension());
        if expected_ext != Some(index.stream_extension.as_str()) {
            return Err(PclError::InvalidArchive(format!(
                "codec {} does not write .{} streams",
                index.codec, index.stream_extension
            )));
        }

        let metadata = container.read(PCLV_ARCHIVE_FORMAT.metadata_entry, MAX_METADATA_BYTES)?;
        serde_json::from_slice::<serde_json::Value>(&metadata)?;

        for (_, _, entry) in index.channel_entries() {
            if !container.contains(&entry) {
                return Err(PclError::MissingEntry(entry));
            }
        }
        for kind in &index.aux_kinds {
            let entry = PCLV_ARCHIVE_FORMAT.aux_entry(kind);
            if !container.contains(&entry) {
                return Err(PclError::MissingEntry(entry));
            }
        }

        tracing::info!(
            "Opened {} ({} scans, {} fields, codec {})",
            path.display(),
            index.num_scans,
            index.field_types.len(),
            index.codec
        );

        Ok(Self {
            container,
            index,
            metadata,
            config,
            extracted: None,
        })
    }

    pub fn path(&self) -> &Path {
        self.container.path()
    }

    pub fn index(&self) -> &ArchiveIndex {
        &self.index
    }

    pub fn field_types(&self) -> &[FieldType] {
        &self.index.field_types
    }

    /// Field names in declaration order.
    pub fn fields(&self) -> Vec<&str> {
        self.index.field_types.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn scans_num(&self) -> usize {
        self.index.num_scans
    }

    pub fn frame_rate(&self) -> f64 {
        self.index.frame_rate
    }

    /// Raw sensor metadata bytes.
    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    pub fn metadata_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_slice(&self.metadata)?)
    }

    pub fn aux_kinds(&self) -> &[String] {
        &self.index.aux_kinds
    }

    /// Load one auxiliary blob.
    pub fn aux(&self, kind: &str) -> Result<AuxBlob> {
        let bytes = self
            .container
            .read(&PCLV_ARCHIVE_FORMAT.aux_entry(kind), MAX_AUX_BYTES)?;
        AuxBlob::from_bytes(&bytes)
    }

    pub fn is_seekable(&self) -> bool {
        false
    }

    pub fn is_indexed(&self) -> bool {
        false
    }

    pub fn is_live(&self) -> bool {
        false
    }

    /// Extract every channel stream into the reader's staging directory, once.
    fn extract_streams(&mut self) -> Result<Arc<Staging>> {
        if let Some(staging) = &self.extracted {
            return Ok(Arc::clone(staging));
        }

        let staging = Staging::temporary()?;
        let dir = staging.streams_dir();
        std::fs::create_dir_all(&dir)?;
        for (_, _, entry) in self.index.channel_entries() {
            let bytes = self.container.extract(&entry, &dir.join(&entry))?;
            tracing::debug!("Extracted {} ({} bytes)", entry, bytes);
        }

        let staging = Arc::new(staging);
        self.extracted = Some(Arc::clone(&staging));
        Ok(staging)
    }

    /// Open fresh decode streams and iterate the reconstructed packets.
    pub fn packets(&mut self) -> Result<ReconstructionIterator> {
        let kind = self
            .index
            .codec_kind()
            .ok_or_else(|| PclError::InvalidArchive(format!("unknown codec '{}'", self.index.codec)))?;
        let codec = codec_for(kind, &self.config)?;
        let staging = self.extract_streams()?;
        let dir = staging.streams_dir();

        let mut streams: Vec<(String, FrameStream)> = Vec::new();
        let mut plans = Vec::with_capacity(self.index.field_types.len());
        for field in &self.index.field_types {
            let shape = self
                .index
                .shape(&field.name)
                .ok_or_else(|| PclError::CorruptLayout(format!("field '{}' has no shape", field.name)))?;
            let (width, height) = plane_dims(shape)?;

            let mut channels: Vec<u8> = self
                .index
                .fields_to_channels
                .get(&field.name)
                .into_iter()
                .flatten()
                .map(|layout| layout.channel)
                .collect();
            channels.sort_unstable();

            for channel in channels {
                let entry = self.index.channel_entry(&field.name, channel);
                streams.push((entry.clone(), codec.decode(&dir.join(&entry), width, height)?));
            }
            plans.push(FieldPlan {
                name: field.name.clone(),
                element_type: field.element_type,
                shape: shape.to_vec(),
            });
        }

        let mut aux = std::collections::BTreeMap::new();
        for kind in &self.index.aux_kinds {
            aux.insert(kind.clone(), self.aux(kind)?.records);
        }

        tracing::debug!("Decoding {} channel streams in lockstep", streams.len());
        Ok(ReconstructionIterator::new(streams, plans, self.index.frame_timestamps.clone(), aux)?.holding(staging))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveWriter, BuildOptions};
    use crate::codec::CodecKind;
    use crate::field::{ElementType, FieldArray};
    use crate::packet::{MemorySource, Packet};

    fn build(dir: &Path) -> std::path::PathBuf {
        let fields = vec![FieldType::new("range", ElementType::U32)];
        let packets = (1..=3u32)
            .map(|i| {
                Packet::new(i as u64 * 1_000_000)
                    .with_field(
                        "range",
                        FieldArray::from_values(vec![2, 3], &[i * 100_000; 6]).unwrap(),
                    )
                    .with_aux("status", FieldArray::from_values(vec![1], &[i as u8]).unwrap())
            })
            .collect();
        let mut source = MemorySource::new(fields, packets).with_metadata(br#"{"beams":2}"#.to_vec());

        let options = BuildOptions {
            config: EncoderConfig {
                codec: CodecKind::Lz4,
                ..EncoderConfig::default()
            },
            ..BuildOptions::default()
        };
        let path = dir.join("scan.pclv");
        ArchiveWriter::new(options).build(&mut source, &path).unwrap();
        path
    }

    #[test]
    fn test_reader_properties() {
        let dir = tempfile::tempdir().unwrap();
        let reader = ArchiveReader::open(&build(dir.path())).unwrap();

        assert_eq!(reader.fields(), vec!["range"]);
        assert_eq!(reader.scans_num(), 3);
        assert_eq!(reader.metadata_json().unwrap()["beams"], 2);
        assert_eq!(reader.aux_kinds(), &["status".to_string()]);
        assert_eq!(reader.aux("status").unwrap().records.len(), 3);
        assert!(!reader.is_seekable());
        assert!(!reader.is_indexed());
        assert!(!reader.is_live());
    }

    #[test]
    fn test_packets_can_be_iterated_twice() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = ArchiveReader::open(&build(dir.path())).unwrap();

        let first: Vec<_> = reader.packets().unwrap().map(|p| p.unwrap()).collect();
        let second: Vec<_> = reader.packets().unwrap().map(|p| p.unwrap()).collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
        assert_eq!(
            first[2].fields["range"].to_values::<u32>().unwrap(),
            vec![300_000; 6]
        );
        assert_eq!(first[1].aux["status"].to_values::<u8>().unwrap(), vec![2]);
    }

    #[test]
    fn test_missing_stream_entry() {
        use super::super::container::ContainerWriter;

        let dir = tempfile::tempdir().unwrap();
        let original = ArchiveReader::open(&build(dir.path())).unwrap();

        // Same index and metadata, no channel streams
        let path = dir.path().join("broken.pclv");
        let mut writer = ContainerWriter::new(std::fs::File::create(&path).unwrap()).unwrap();
        writer
            .add_bytes(PCLV_ARCHIVE_FORMAT.index_entry, &original.index().to_json().unwrap())
            .unwrap();
        writer
            .add_bytes(PCLV_ARCHIVE_FORMAT.metadata_entry, original.metadata())
            .unwrap();
        writer.finish().unwrap();

        assert!(matches!(
            ArchiveReader::open(&path),
            Err(PclError::MissingEntry(name)) if name == "range_ch0.plz4"
        ));
    }
}

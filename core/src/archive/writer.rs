//! Archive builds: packets in, one `.pclv` file out.

use std::ffi::OsString;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

use pclvid_shared::PCLV_ARCHIVE_FORMAT;
use rayon::prelude::*;

use super::container::ContainerWriter;
use super::index::ArchiveIndex;
use crate::codec::{VideoCodec, codec_for};
use crate::config::EncoderConfig;
use crate::error::{PclError, Result};
use crate::packet::PacketSource;
use crate::sequencer::{FrameSequencer, Sequenced, SequencedCapture};
use crate::staging::Staging;

/// Options for one build.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub config: EncoderConfig,

    /// Caller staging directory (kept afterwards); temporary when `None`
    pub staging: Option<PathBuf>,

    /// Sensor metadata JSON overriding whatever the source provides
    pub metadata: Option<Vec<u8>>,
}

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub archive: PathBuf,
    pub archive_size: u64,
    pub packets_accepted: usize,
    pub packets_skipped: usize,
    pub frame_rate: f64,
    pub codec: &'static str,
    pub quality: u32,

    /// Entry names of the channel streams, in index order
    pub streams: Vec<String>,

    /// Staging directory left in place for the caller, if any
    pub staging: Option<PathBuf>,
}

pub struct ArchiveWriter {
    options: BuildOptions,
}

impl ArchiveWriter {
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Sequence, encode and bundle every packet of `source` into `destination`.
    ///
    /// Nothing is written at `destination` unless the whole build succeeds.
    pub fn build(&self, source: &mut dyn PacketSource, destination: &Path) -> Result<BuildReport> {
        let config = &self.options.config;
        config.validate()?;
        if source.field_types().is_empty() {
            return Err(PclError::CorruptLayout("source declares no fields".to_string()));
        }
        let codec = codec_for(config.codec, config)?;
        let metadata = self.sensor_metadata(source)?;

        let staging = Staging::acquire(self.options.staging.as_deref())?;
        tracing::info!(
            "Building {} with {} (quality {}) in {}",
            destination.display(),
            codec.id(),
            config.quality,
            staging.path().display()
        );

        let start = Instant::now();
        let capture = sequence(source, &staging, config.fallback_frame_rate)?;
        tracing::info!(
            "Sequenced {} packets ({} skipped) into {} channel streams in {:.2?}",
            capture.frame_timestamps.len(),
            capture.skipped,
            capture.channels.len(),
            start.elapsed()
        );

        let start = Instant::now();
        let streams = encode_channels(codec.as_ref(), &capture, config, &staging)?;
        tracing::info!("Encoded {} streams in {:.2?}", streams.len(), start.elapsed());

        let index = ArchiveIndex::describe(&capture, codec.id(), codec.stream_extension(), config.quality);
        write_atomically(destination, |file| bundle(file, &index, &metadata, &capture, &streams))?;

        let archive_size = std::fs::metadata(destination)?.len();
        tracing::info!("Wrote {} ({} bytes)", destination.display(), archive_size);

        let kept = (!staging.is_owned()).then(|| staging.path().to_path_buf());
        if let Some(dir) = &kept {
            tracing::info!("Staging directory kept at {}", dir.display());
        }

        Ok(BuildReport {
            archive: destination.to_path_buf(),
            archive_size,
            packets_accepted: capture.frame_timestamps.len(),
            packets_skipped: capture.skipped,
            frame_rate: capture.frame_rate,
            codec: codec.id(),
            quality: config.quality,
            streams: streams.into_iter().map(|(entry, _)| entry).collect(),
            staging: kept,
        })
    }

    /// Metadata JSON from the options, else the source, else `{}`.
    fn sensor_metadata(&self, source: &dyn PacketSource) -> Result<Vec<u8>> {
        let metadata = self
            .options
            .metadata
            .as_deref()
            .or_else(|| source.sensor_metadata())
            .unwrap_or(b"{}")
            .to_vec();
        serde_json::from_slice::<serde_json::Value>(&metadata)?;
        Ok(metadata)
    }
}

fn sequence(source: &mut dyn PacketSource, staging: &Staging, fallback_frame_rate: f64) -> Result<SequencedCapture> {
    let mut sequencer = FrameSequencer::new(source.field_types().to_vec(), staging, fallback_frame_rate)?;
    if let Some(hint) = source.scans_hint() {
        tracing::debug!("Source reports about {} packets", hint);
    }

    while let Some(packet) = source.next_packet()? {
        if let Sequenced::Accepted(frame) = sequencer.push(&packet)?
            && (frame + 1) % 1000 == 0
        {
            tracing::debug!("{} packets sequenced", frame + 1);
        }
    }
    sequencer.finish()
}

/// Encode every channel sequence on a pool of `config.jobs` threads.
fn encode_channels(
    codec: &dyn VideoCodec,
    capture: &SequencedCapture,
    config: &EncoderConfig,
    staging: &Staging,
) -> Result<Vec<(String, PathBuf)>> {
    let streams_dir = staging.streams_dir();
    std::fs::create_dir_all(&streams_dir)?;

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = config.jobs {
        pool = pool.num_threads(jobs);
    }
    let pool = pool
        .build()
        .map_err(|e| PclError::Config(format!("failed to start encoder pool: {e}")))?;

    pool.install(|| {
        capture
            .channels
            .par_iter()
            .map(|channel| {
                let entry = PCLV_ARCHIVE_FORMAT.channel_entry(&channel.field, channel.channel, codec.stream_extension());
                let output = streams_dir.join(&entry);
                tracing::debug!("Encoding {} ({} frames)", entry, channel.frames.len());
                codec.encode(&channel.frames, capture.frame_rate, config.quality, &output)?;
                Ok((entry, output))
            })
            .collect()
    })
}

fn bundle(
    file: File,
    index: &ArchiveIndex,
    metadata: &[u8],
    capture: &SequencedCapture,
    streams: &[(String, PathBuf)],
) -> Result<()> {
    let mut container = ContainerWriter::new(BufWriter::new(file))?;
    container.add_bytes(PCLV_ARCHIVE_FORMAT.index_entry, &index.to_json()?)?;
    container.add_bytes(PCLV_ARCHIVE_FORMAT.metadata_entry, metadata)?;
    for (entry, path) in streams {
        container.add_file(entry, path)?;
    }
    for (kind, blob) in &capture.aux {
        container.add_bytes(&PCLV_ARCHIVE_FORMAT.aux_entry(kind), &blob.to_bytes()?)?;
    }
    container
        .finish()?
        .into_inner()
        .map_err(|e| PclError::Io(e.into_error()))?
        .sync_all()?;
    Ok(())
}

/// Write through a `.partial` sibling and rename it over `destination` on success.
fn write_atomically(destination: &Path, write: impl FnOnce(File) -> Result<()>) -> Result<()> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut partial: OsString = destination.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    let result = File::create(&partial)
        .map_err(PclError::from)
        .and_then(write)
        .and_then(|()| std::fs::rename(&partial, destination).map_err(PclError::from));
    if result.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    result
}

//! Capture files (`.pclcap`): uncompressed packet streams on disk.
//!
//! Captures are the input of a build and the output of a full read, so the
//! CLI can round-trip real data without a sensor SDK.
//!
//! # File Structure
//!
//! ```text
//! magic "PCLC" | u32 version
//! u32 header_len | header (JSON: field types, sensor metadata)
//! record*      : u8 tag = 1 | u64 timestamp | field map | aux map
//! terminator   : u8 tag = 0
//! ```
//!
//! Maps use the layout in [`crate::encoding`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use pclvid_shared::PCLC_CAPTURE_FORMAT;
use serde::{Deserialize, Serialize};

use crate::encoding::{read_array_map, write_array_map};
use crate::error::{PclError, Result};
use crate::field::FieldType;
use crate::packet::{Packet, PacketSource};

const TAG_END: u8 = 0;
const TAG_PACKET: u8 = 1;

/// JSON header of a capture file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureHeader {
    pub field_types: Vec<FieldType>,

    /// Sensor description (JSON text), if the capture carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_metadata: Option<String>,

    /// Number of packets, when known up front
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_count: Option<u64>,
}

/// Streaming capture writer.
pub struct CaptureWriter<W: Write> {
    writer: W,
    written: u64,
}

impl CaptureWriter<BufWriter<File>> {
    /// Create a capture file at `path`.
    pub fn create(path: &Path, header: &CaptureHeader) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), header)
    }
}

impl<W: Write> CaptureWriter<W> {
    /// Write the magic, version and header, ready for packets.
    pub fn new(mut writer: W, header: &CaptureHeader) -> Result<Self> {
        writer.write_all(PCLC_CAPTURE_FORMAT.magic)?;
        writer.write_u32::<LittleEndian>(PCLC_CAPTURE_FORMAT.version)?;

        let json = serde_json::to_vec(header)?;
        writer.write_u32::<LittleEndian>(json.len() as u32)?;
        writer.write_all(&json)?;

        Ok(Self { writer, written: 0 })
    }

    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.writer.write_u8(TAG_PACKET)?;
        self.writer.write_u64::<LittleEndian>(packet.timestamp)?;
        write_array_map(&mut self.writer, &packet.fields)?;
        write_array_map(&mut self.writer, &packet.aux)?;
        self.written += 1;
        Ok(())
    }

    /// Packets written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Write the terminator and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.write_u8(TAG_END)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Streaming capture reader; a [`PacketSource`].
pub struct CaptureReader<R: Read> {
    reader: R,
    header: CaptureHeader,
    finished: bool,
}

impl CaptureReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> CaptureReader<R> {
    /// Validate the magic and version and read the header.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != PCLC_CAPTURE_FORMAT.magic {
            return Err(PclError::InvalidArchive(format!(
                "invalid capture magic bytes {magic:?} (expected {:?})",
                PCLC_CAPTURE_FORMAT.magic
            )));
        }

        let version = reader.read_u32::<LittleEndian>()?;
        if version > PCLC_CAPTURE_FORMAT.version {
            return Err(PclError::UnsupportedVersion {
                found: version,
                supported: PCLC_CAPTURE_FORMAT.version,
            });
        }

        let len = reader.read_u32::<LittleEndian>()? as usize;
        let mut json = vec![0u8; len];
        reader.read_exact(&mut json)?;
        let header: CaptureHeader = serde_json::from_slice(&json)?;

        Ok(Self {
            reader,
            header,
            finished: false,
        })
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }
}

impl<R: Read> PacketSource for CaptureReader<R> {
    fn field_types(&self) -> &[FieldType] {
        &self.header.field_types
    }

    fn scans_hint(&self) -> Option<usize> {
        self.header.packet_count.map(|n| n as usize)
    }

    fn sensor_metadata(&self) -> Option<&[u8]> {
        self.header.sensor_metadata.as_deref().map(str::as_bytes)
    }

    fn next_packet(&mut self) -> Result<Option<Packet>> {
        if self.finished {
            return Ok(None);
        }

        match self.reader.read_u8()? {
            TAG_END => {
                self.finished = true;
                Ok(None)
            }
            TAG_PACKET => {
                let timestamp = self.reader.read_u64::<LittleEndian>()?;
                let fields = read_array_map(&mut self.reader)?;
                let aux = read_array_map(&mut self.reader)?;
                Ok(Some(Packet {
                    timestamp,
                    fields,
                    aux,
                }))
            }
            tag => Err(PclError::InvalidArchive(format!("unknown capture record tag {tag}"))),
        }
    }
}

/// Drain a packet source into a capture file; returns the packet count.
pub fn write_capture(path: &Path, source: &mut dyn PacketSource) -> Result<u64> {
    let header = CaptureHeader {
        field_types: source.field_types().to_vec(),
        sensor_metadata: source
            .sensor_metadata()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        packet_count: source.scans_hint().map(|n| n as u64),
    };

    let mut writer = CaptureWriter::create(path, &header)?;
    while let Some(packet) = source.next_packet()? {
        writer.write_packet(&packet)?;
    }
    let written = writer.written();
    writer.finish()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{ElementType, FieldArray};
    use crate::packet::MemorySource;

    fn sample_packets() -> Vec<Packet> {
        (0..3u64)
            .map(|i| {
                Packet::new(1_000 + i)
                    .with_field(
                        "range",
                        FieldArray::from_values(vec![2, 2], &[i as u32, 1, 2, 3]).unwrap(),
                    )
                    .with_aux("status", FieldArray::from_values(vec![2], &[1u32, 0]).unwrap())
            })
            .collect()
    }

    #[test]
    fn test_capture_roundtrip_in_memory() {
        let header = CaptureHeader {
            field_types: vec![FieldType::new("range", ElementType::U32)],
            sensor_metadata: Some("{\"beams\":2}".to_string()),
            packet_count: Some(3),
        };

        let mut writer = CaptureWriter::new(Vec::new(), &header).unwrap();
        for packet in sample_packets() {
            writer.write_packet(&packet).unwrap();
        }
        assert_eq!(writer.written(), 3);
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[0..4], PCLC_CAPTURE_FORMAT.magic);

        let mut reader = CaptureReader::new(bytes.as_slice()).unwrap();
        assert_eq!(reader.scans_hint(), Some(3));
        assert_eq!(reader.sensor_metadata(), Some(&b"{\"beams\":2}"[..]));

        let mut read = Vec::new();
        while let Some(packet) = reader.next_packet().unwrap() {
            read.push(packet);
        }
        assert_eq!(read, sample_packets());
        assert!(reader.next_packet().unwrap().is_none());
    }

    #[test]
    fn test_write_capture_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pclcap");
        let mut source = MemorySource::new(
            vec![FieldType::new("range", ElementType::U32)],
            sample_packets(),
        );

        assert_eq!(write_capture(&path, &mut source).unwrap(), 3);

        let mut reader = CaptureReader::open(&path).unwrap();
        assert_eq!(reader.field_types().len(), 1);
        assert_eq!(reader.next_packet().unwrap().unwrap().timestamp, 1_000);
    }

    #[test]
    fn test_bad_magic() {
        let result = CaptureReader::new(&b"NOPE\x01\x00\x00\x00"[..]);
        assert!(matches!(result, Err(PclError::InvalidArchive(_))));
    }

    #[test]
    fn test_future_version() {
        let mut bytes = PCLC_CAPTURE_FORMAT.magic.to_vec();
        bytes.extend_from_slice(&99u32.to_le_bytes());
        let result = CaptureReader::new(bytes.as_slice());
        assert!(matches!(
            result,
            Err(PclError::UnsupportedVersion { found: 99, .. })
        ));
    }
}

//! Binary encoding of field arrays shared by capture files and auxiliary blobs.
//!
//! ```text
//! array  : u8 element tag | u8 rank | u32 dim * rank | u64 len | LZ4 block (size-prepended)
//! string : u16 len | utf-8 bytes
//! map    : u32 count | (string, array) * count
//! ```
//!
//! All integers are little-endian.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::error::{PclError, Result};
use crate::field::{ElementType, FieldArray};

/// Upper bound on a single encoded payload, guards against corrupt lengths.
const MAX_PAYLOAD_BYTES: u64 = 1 << 32;

pub fn write_str<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string longer than 65535 bytes"))?;
    writer.write_u16::<LittleEndian>(len)?;
    writer.write_all(value.as_bytes())
}

pub fn read_str<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| PclError::InvalidArchive(format!("non utf-8 name: {e}")))
}

pub fn write_array<W: Write>(writer: &mut W, array: &FieldArray) -> io::Result<()> {
    let rank = u8::try_from(array.shape().len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "array rank above 255"))?;
    writer.write_u8(array.element_type().tag())?;
    writer.write_u8(rank)?;
    for &dim in array.shape() {
        let dim = u32::try_from(dim)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "array dimension above u32"))?;
        writer.write_u32::<LittleEndian>(dim)?;
    }

    let compressed = compress_prepend_size(array.as_bytes());
    writer.write_u64::<LittleEndian>(compressed.len() as u64)?;
    writer.write_all(&compressed)
}

pub fn read_array<R: Read>(reader: &mut R) -> Result<FieldArray> {
    let tag = reader.read_u8()?;
    let element_type = ElementType::from_tag(tag)
        .ok_or_else(|| PclError::InvalidArchive(format!("unknown element tag {tag}")))?;

    let rank = reader.read_u8()? as usize;
    let mut shape = Vec::with_capacity(rank);
    for _ in 0..rank {
        shape.push(reader.read_u32::<LittleEndian>()? as usize);
    }

    let len = reader.read_u64::<LittleEndian>()?;
    if len > MAX_PAYLOAD_BYTES {
        return Err(PclError::InvalidArchive(format!("array payload of {len} bytes")));
    }
    let mut compressed = vec![0u8; len as usize];
    reader.read_exact(&mut compressed)?;
    let bytes = decompress_size_prepended(&compressed)
        .map_err(|e| PclError::InvalidArchive(format!("corrupt array payload: {e}")))?;

    FieldArray::from_le_bytes(element_type, shape, bytes)
}

pub fn write_array_map<W: Write>(writer: &mut W, arrays: &BTreeMap<String, FieldArray>) -> io::Result<()> {
    writer.write_u32::<LittleEndian>(arrays.len() as u32)?;
    for (name, array) in arrays {
        write_str(writer, name)?;
        write_array(writer, array)?;
    }
    Ok(())
}

pub fn read_array_map<R: Read>(reader: &mut R) -> Result<BTreeMap<String, FieldArray>> {
    let count = reader.read_u32::<LittleEndian>()?;
    let mut arrays = BTreeMap::new();
    for _ in 0..count {
        let name = read_str(reader)?;
        let array = read_array(reader)?;
        arrays.insert(name, array);
    }
    Ok(arrays)
}

/// One auxiliary array attached to an accepted packet.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxRecord {
    /// Frame index of the packet the array belongs to
    pub frame: u64,
    pub timestamp: u64,
    pub array: FieldArray,
}

impl AuxRecord {
    pub fn new(frame: u64, timestamp: u64, array: FieldArray) -> Self {
        Self { frame, timestamp, array }
    }
}

/// Per-kind auxiliary blob.
///
/// ```text
/// u32 count | (u64 frame | u64 timestamp | array) * count
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxBlob {
    /// Records in ascending frame order; frames without this kind have no record
    pub records: Vec<AuxRecord>,
}

impl AuxBlob {
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        bytes.write_u32::<LittleEndian>(self.records.len() as u32)?;
        for record in &self.records {
            bytes.write_u64::<LittleEndian>(record.frame)?;
            bytes.write_u64::<LittleEndian>(record.timestamp)?;
            write_array(&mut bytes, &record.array)?;
        }
        Ok(bytes)
    }

    pub fn from_bytes(mut bytes: &[u8]) -> Result<Self> {
        let count = bytes.read_u32::<LittleEndian>()?;
        let mut records: Vec<AuxRecord> = Vec::with_capacity(count.min(1 << 16) as usize);
        for _ in 0..count {
            let frame = bytes.read_u64::<LittleEndian>()?;
            let timestamp = bytes.read_u64::<LittleEndian>()?;
            if records.last().is_some_and(|last| last.frame >= frame) {
                return Err(PclError::InvalidArchive(format!(
                    "auxiliary record for frame {frame} is out of order"
                )));
            }
            records.push(AuxRecord::new(frame, timestamp, read_array(&mut bytes)?));
        }
        Ok(Self { records })
    }
}

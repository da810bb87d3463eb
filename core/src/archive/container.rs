//! Sequential entry container underneath `.pclv` archives.
//!
//! ```text
//! magic "PCLV" | u32 version
//! entry*      : u16 name_len | name (utf-8) | u64 data_len | data
//! terminator  : u16 0
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use pclvid_shared::PCLV_ARCHIVE_FORMAT;

use crate::error::{PclError, Result};

/// Writes entries one after another, then the terminator.
pub struct ContainerWriter<W: Write> {
    writer: W,
    names: HashSet<String>,
}

impl<W: Write> ContainerWriter<W> {
    /// Write the magic and version header.
    pub fn new(mut writer: W) -> Result<Self> {
        writer.write_all(PCLV_ARCHIVE_FORMAT.magic)?;
        writer.write_u32::<LittleEndian>(PCLV_ARCHIVE_FORMAT.version)?;
        Ok(Self {
            writer,
            names: HashSet::new(),
        })
    }

    fn write_entry_header(&mut self, name: &str, len: u64) -> Result<()> {
        let name_len = u16::try_from(name.len())
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| PclError::InvalidArchive(format!("invalid entry name {name:?}")))?;
        if !self.names.insert(name.to_string()) {
            return Err(PclError::InvalidArchive(format!("duplicate entry {name}")));
        }

        self.writer.write_u16::<LittleEndian>(name_len)?;
        self.writer.write_all(name.as_bytes())?;
        self.writer.write_u64::<LittleEndian>(len)?;
        Ok(())
    }

    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.write_entry_header(name, data.len() as u64)?;
        self.writer.write_all(data)?;
        Ok(())
    }

    /// Copy a file into the container without loading it into memory.
    pub fn add_file(&mut self, name: &str, path: &Path) -> Result<()> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        self.write_entry_header(name, len)?;

        let copied = io::copy(&mut (&mut file).take(len), &mut self.writer)?;
        if copied != len {
            return Err(PclError::InvalidArchive(format!(
                "{} shrank while being archived",
                path.display()
            )));
        }
        Ok(())
    }

    /// Write the terminator and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.write_u16::<LittleEndian>(0)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Location of one entry's data within the container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryLocation {
    pub offset: u64,
    pub len: u64,
}

/// Random-access view over a container file, built by one scan of the entry table.
#[derive(Debug)]
pub struct ContainerReader {
    path: PathBuf,
    file: File,
    version: u32,
    entries: BTreeMap<String, EntryLocation>,
}

impl ContainerReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(&file);

        let (version, entries) = scan(&mut reader, file_len).map_err(|e| match e {
            PclError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
                PclError::InvalidArchive(format!("{} is truncated", path.display()))
            }
            other => other,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            version,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Entry names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn location(&self, name: &str) -> Option<EntryLocation> {
        self.entries.get(name).copied()
    }

    fn entry_reader(&self, name: &str) -> Result<io::Take<&File>> {
        let location = self
            .location(name)
            .ok_or_else(|| PclError::MissingEntry(name.to_string()))?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(location.offset))?;
        Ok(file.take(location.len))
    }

    /// Read a whole entry, refusing entries above `max_bytes`.
    pub fn read(&self, name: &str, max_bytes: u64) -> Result<Vec<u8>> {
        let location = self
            .location(name)
            .ok_or_else(|| PclError::MissingEntry(name.to_string()))?;
        if location.len > max_bytes {
            return Err(PclError::InvalidArchive(format!(
                "entry {name} is {} bytes (limit {max_bytes})",
                location.len
            )));
        }

        let mut data = Vec::with_capacity(location.len as usize);
        self.entry_reader(name)?.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Copy an entry out to `dest`.
    pub fn extract(&self, name: &str, dest: &Path) -> Result<u64> {
        let mut output = File::create(dest)?;
        let copied = io::copy(&mut self.entry_reader(name)?, &mut output)?;
        output.flush()?;
        Ok(copied)
    }
}

fn scan<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<(u32, BTreeMap<String, EntryLocation>)> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != PCLV_ARCHIVE_FORMAT.magic {
        return Err(PclError::InvalidArchive(format!(
            "bad magic {magic:02x?} (expected {:?})",
            String::from_utf8_lossy(PCLV_ARCHIVE_FORMAT.magic)
        )));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version == 0 {
        return Err(PclError::InvalidArchive("container version 0".to_string()));
    }
    if version > PCLV_ARCHIVE_FORMAT.version {
        return Err(PclError::UnsupportedVersion {
            found: version,
            supported: PCLV_ARCHIVE_FORMAT.version,
        });
    }

    let mut entries = BTreeMap::new();
    loop {
        let name_len = reader.read_u16::<LittleEndian>()? as usize;
        if name_len == 0 {
            break;
        }

        let mut name = vec![0u8; name_len];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8(name)
            .map_err(|e| PclError::InvalidArchive(format!("non utf-8 entry name: {e}")))?;

        let len = reader.read_u64::<LittleEndian>()?;
        let offset = reader.stream_position()?;
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= file_len)
            .ok_or_else(|| PclError::InvalidArchive(format!("entry {name} runs past end of file")))?;
        reader.seek(SeekFrom::Start(end))?;

        if entries.insert(name.clone(), EntryLocation { offset, len }).is_some() {
            return Err(PclError::InvalidArchive(format!("duplicate entry {name}")));
        }
    }

    Ok((version, entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_container(path: &Path, entries: &[(&str, &[u8])]) {
        let mut writer = ContainerWriter::new(File::create(path).unwrap()).unwrap();
        for (name, data) in entries {
            writer.add_bytes(name, data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_entries_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pclv");
        write_container(
            &path,
            &[("metadata.json", b"{}"), ("range_ch0.plz4", &[1, 2, 3, 4, 5]), ("empty", b"")],
        );

        let reader = ContainerReader::open(&path).unwrap();
        assert_eq!(reader.version(), 1);
        assert_eq!(
            reader.names().collect::<Vec<_>>(),
            vec!["empty", "metadata.json", "range_ch0.plz4"]
        );
        assert_eq!(reader.read("range_ch0.plz4", 1024).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(reader.read("metadata.json", 1024).unwrap(), b"{}");
        assert!(reader.read("empty", 0).unwrap().is_empty());
        assert!(matches!(reader.read("nope", 10), Err(PclError::MissingEntry(_))));
        assert!(matches!(
            reader.read("range_ch0.plz4", 2),
            Err(PclError::InvalidArchive(_))
        ));
    }

    #[test]
    fn test_add_file_and_extract() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("stream.bin");
        std::fs::write(&source, vec![7u8; 10_000]).unwrap();

        let path = dir.path().join("a.pclv");
        let mut writer = ContainerWriter::new(File::create(&path).unwrap()).unwrap();
        writer.add_file("signal_ch0.mp4", &source).unwrap();
        writer.finish().unwrap();

        let reader = ContainerReader::open(&path).unwrap();
        let out = dir.path().join("out.mp4");
        assert_eq!(reader.extract("signal_ch0.mp4", &out).unwrap(), 10_000);
        assert_eq!(std::fs::read(out).unwrap(), vec![7u8; 10_000]);
    }

    #[test]
    fn test_duplicate_entry_is_rejected() {
        let mut writer = ContainerWriter::new(Vec::new()).unwrap();
        writer.add_bytes("x", b"1").unwrap();
        assert!(matches!(writer.add_bytes("x", b"2"), Err(PclError::InvalidArchive(_))));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pclv");
        std::fs::write(&path, b"PK\x03\x04\x01\x00\x00\x00\x00\x00").unwrap();

        assert!(matches!(
            ContainerReader::open(&path),
            Err(PclError::InvalidArchive(_))
        ));
    }

    #[test]
    fn test_future_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.pclv");
        let mut bytes = b"PCLV".to_vec();
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            ContainerReader::open(&path),
            Err(PclError::UnsupportedVersion { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn test_truncated_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.pclv");
        write_container(&path, &[("range_ch0.plz4", &[0u8; 64])]);

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();
        assert!(matches!(
            ContainerReader::open(&path),
            Err(PclError::InvalidArchive(_))
        ));

        // Missing terminator only
        std::fs::write(&path, &bytes[..bytes.len() - 2]).unwrap();
        assert!(matches!(
            ContainerReader::open(&path),
            Err(PclError::InvalidArchive(_))
        ));
    }
}

//! Built-in lossless frame codec (LZ4 blocks, no external process).
//!
//! ```text
//! magic "PLZ4" | u32 width | u32 height | u32 frame_count
//! frame*       : u32 block_len | LZ4 block (size-prepended)
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use super::{FrameSequence, FrameStream, LOSSLESS_QUALITY, VideoCodec};
use crate::error::{PclError, Result};
use crate::planes::Plane;

const MAGIC: &[u8; 4] = b"PLZ4";

/// Lossless LZ4 frame stream codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4FrameCodec;

impl Lz4FrameCodec {
    pub const ID: &'static str = "lz4";
    pub const EXTENSION: &'static str = "plz4";
}

impl VideoCodec for Lz4FrameCodec {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn stream_extension(&self) -> &'static str {
        Self::EXTENSION
    }

    fn encode(&self, frames: &FrameSequence, _frame_rate: f64, quality: u32, output: &Path) -> Result<()> {
        if quality != LOSSLESS_QUALITY {
            tracing::debug!(
                "{}: lz4 codec is always lossless, ignoring quality {}",
                frames.stream(),
                quality
            );
        }

        let encode_err = |e: std::io::Error| PclError::encode(frames.stream(), e);
        let mut writer = BufWriter::new(File::create(output).map_err(encode_err)?);
        writer.write_all(MAGIC).map_err(encode_err)?;
        writer.write_u32::<LittleEndian>(frames.width()).map_err(encode_err)?;
        writer.write_u32::<LittleEndian>(frames.height()).map_err(encode_err)?;
        writer.write_u32::<LittleEndian>(frames.len() as u32).map_err(encode_err)?;

        for index in 0..frames.len() {
            let plane = frames.read(index)?;
            let block = compress_prepend_size(plane.as_bytes());
            writer.write_u32::<LittleEndian>(block.len() as u32).map_err(encode_err)?;
            writer.write_all(&block).map_err(encode_err)?;
        }
        writer.flush().map_err(encode_err)?;
        Ok(())
    }

    fn decode(&self, stream: &Path, width: u32, height: u32) -> Result<FrameStream> {
        let name = stream.display().to_string();
        let decode_err = |e: std::io::Error| PclError::decode(name.clone(), e);

        let mut reader = BufReader::new(File::open(stream).map_err(decode_err)?);
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic).map_err(decode_err)?;
        if &magic != MAGIC {
            return Err(PclError::decode(name.clone(), "not an lz4 frame stream"));
        }

        let stream_width = reader.read_u32::<LittleEndian>().map_err(decode_err)?;
        let stream_height = reader.read_u32::<LittleEndian>().map_err(decode_err)?;
        if (stream_width, stream_height) != (width, height) {
            return Err(PclError::decode(
                name.clone(),
                format!("stream is {stream_width}x{stream_height}, expected {width}x{height}"),
            ));
        }
        let remaining = reader.read_u32::<LittleEndian>().map_err(decode_err)?;

        Ok(Box::new(Lz4FrameStream {
            name,
            reader,
            width,
            height,
            remaining,
        }))
    }
}

struct Lz4FrameStream {
    name: String,
    reader: BufReader<File>,
    width: u32,
    height: u32,
    remaining: u32,
}

impl Lz4FrameStream {
    fn read_frame(&mut self) -> Result<Plane> {
        let len = self
            .reader
            .read_u32::<LittleEndian>()
            .map_err(|e| PclError::decode(self.name.clone(), e))?;
        let mut block = vec![0u8; len as usize];
        self.reader
            .read_exact(&mut block)
            .map_err(|e| PclError::decode(self.name.clone(), e))?;
        let data = decompress_size_prepended(&block)
            .map_err(|e| PclError::decode(self.name.clone(), e))?;
        Plane::new(self.width, self.height, data)
            .map_err(|e| PclError::decode(self.name.clone(), e))
    }
}

impl Iterator for Lz4FrameStream {
    type Item = Result<Plane>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let frame = self.read_frame();
        if frame.is_err() {
            // A broken stream yields its error once, then ends
            self.remaining = 0;
        }
        Some(frame)
    }
}

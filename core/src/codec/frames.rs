//! Staged frame sequences (one directory of grayscale PNGs per channel).

use std::path::PathBuf;

use image::{GrayImage, ImageFormat};

use crate::error::{PclError, Result};
use crate::planes::Plane;

/// Ordered frames of one (field, channel), staged as `%08d.png` files.
///
/// Frame `i` is the plane of the `i`-th accepted packet, so lexical file
/// order, numeric order and capture order all agree.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    stream: String,
    dir: PathBuf,
    width: u32,
    height: u32,
    count: usize,
}

impl FrameSequence {
    /// Start an empty sequence in `dir` (created if missing).
    pub fn create(stream: impl Into<String>, dir: PathBuf, width: u32, height: u32) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            stream: stream.into(),
            dir,
            width,
            height,
            count: 0,
        })
    }

    /// Append the next frame.
    pub fn push(&mut self, plane: Plane) -> Result<()> {
        if plane.width() != self.width || plane.height() != self.height {
            return Err(PclError::CorruptLayout(format!(
                "{}: frame {} is {}x{}, sequence is {}x{}",
                self.stream,
                self.count,
                plane.width(),
                plane.height(),
                self.width,
                self.height
            )));
        }

        let image = GrayImage::from_raw(self.width, self.height, plane.into_bytes()).ok_or_else(|| {
            PclError::CorruptLayout(format!("{}: frame buffer size mismatch", self.stream))
        })?;
        image.save_with_format(self.frame_path(self.count), ImageFormat::Png)?;
        self.count += 1;
        Ok(())
    }

    /// Read a staged frame back.
    pub fn read(&self, index: usize) -> Result<Plane> {
        let image = image::open(self.frame_path(index))?.into_luma8();
        if image.width() != self.width || image.height() != self.height {
            return Err(PclError::CorruptLayout(format!(
                "{}: staged frame {index} is {}x{}",
                self.stream,
                image.width(),
                image.height()
            )));
        }
        Plane::new(self.width, self.height, image.into_raw())
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index:08}.png"))
    }

    /// printf-style input pattern for image-sequence readers.
    pub fn pattern(&self) -> PathBuf {
        self.dir.join("%08d.png")
    }

    /// Archive entry name of the stream this sequence encodes to (without extension).
    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

//! Byte-plane decomposition of typed field arrays.
//!
//! An element of `N` bytes is split into `N` single-byte channel planes.
//! Channel `c` holds byte `c` of each element's **little-endian**
//! representation, so channel 0 is always the least significant byte. The
//! order is fixed by the container format (version 1) and does not depend on
//! the host's native byte order.
//!
//! ```text
//! u32 element 0xAABBCCDD
//!   ch0 = 0xDD   ch1 = 0xCC   ch2 = 0xBB   ch3 = 0xAA
//! ```
//!
//! [`recompose`] is the exact left-inverse of [`decompose`]: no bit of the
//! original array is lost by the plane split itself, whatever the video codec
//! later does to the planes.

use crate::error::{PclError, Result};
use crate::field::{ElementType, FieldArray, raster_dims};

/// A single 8-bit grayscale raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Plane {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(PclError::CorruptLayout(format!(
                "{width}x{height} plane needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Raster dimensions of a shape as `(width, height)` image dimensions.
pub fn plane_dims(shape: &[usize]) -> Result<(u32, u32)> {
    let (rows, cols) = raster_dims(shape);
    let width = u32::try_from(cols)
        .map_err(|_| PclError::CorruptLayout(format!("raster width {cols} is too large")))?;
    let height = u32::try_from(rows)
        .map_err(|_| PclError::CorruptLayout(format!("raster height {rows} is too large")))?;
    Ok((width, height))
}

/// Split an array into `byte_width` channel planes, least significant first.
pub fn decompose(array: &FieldArray) -> Result<Vec<Plane>> {
    let (width, height) = plane_dims(array.shape())?;
    let channels = array.element_type().byte_width();

    // Identity reshape for single-byte types
    if channels == 1 {
        return Ok(vec![Plane::new(width, height, array.as_bytes().to_vec())?]);
    }

    let mut planes: Vec<Vec<u8>> = (0..channels)
        .map(|_| Vec::with_capacity(array.len()))
        .collect();
    for element in array.as_bytes().chunks_exact(channels) {
        for (plane, &byte) in planes.iter_mut().zip(element) {
            plane.push(byte);
        }
    }

    planes
        .into_iter()
        .map(|data| Plane::new(width, height, data))
        .collect()
}

/// Interleave channel planes (ordered by channel index) back into an array.
///
/// Fails with [`PclError::CorruptLayout`] when the plane count differs from
/// the element byte width or when a plane does not match `shape`.
pub fn recompose(planes: &[Plane], element_type: ElementType, shape: &[usize]) -> Result<FieldArray> {
    let channels = element_type.byte_width();
    if planes.len() != channels {
        return Err(PclError::CorruptLayout(format!(
            "{element_type} needs {channels} channel planes, got {}",
            planes.len()
        )));
    }

    let (width, height) = plane_dims(shape)?;
    let elements: usize = shape.iter().product();
    for (channel, plane) in planes.iter().enumerate() {
        if plane.width() != width || plane.height() != height || plane.as_bytes().len() != elements {
            return Err(PclError::CorruptLayout(format!(
                "channel {channel} is {}x{}, expected {width}x{height} for shape {shape:?}",
                plane.width(),
                plane.height()
            )));
        }
    }

    let mut bytes = Vec::with_capacity(elements * channels);
    if channels == 1 {
        bytes.extend_from_slice(planes[0].as_bytes());
    } else {
        for i in 0..elements {
            bytes.extend(planes.iter().map(|plane| plane.as_bytes()[i]));
        }
    }

    FieldArray::from_le_bytes(element_type, shape.to_vec(), bytes)
}

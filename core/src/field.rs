//! Field data model: element types, field declarations and typed arrays.
//!
//! A [`FieldArray`] always stores its elements as **little-endian** bytes, no
//! matter which platform produced it. Typed access goes through the
//! [`Element`] trait so callers never reinterpret memory directly.

use serde::{Deserialize, Serialize};

use crate::error::{PclError, Result};

/// Fixed-width numeric element type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ElementType {
    /// All element types, in tag order.
    pub const ALL: [ElementType; 10] = [
        ElementType::U8,
        ElementType::I8,
        ElementType::U16,
        ElementType::I16,
        ElementType::U32,
        ElementType::I32,
        ElementType::U64,
        ElementType::I64,
        ElementType::F32,
        ElementType::F64,
    ];

    /// Size of one element in bytes (= number of channel planes).
    pub const fn byte_width(self) -> usize {
        match self {
            ElementType::U8 | ElementType::I8 => 1,
            ElementType::U16 | ElementType::I16 => 2,
            ElementType::U32 | ElementType::I32 | ElementType::F32 => 4,
            ElementType::U64 | ElementType::I64 | ElementType::F64 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ElementType::U8 => "u8",
            ElementType::I8 => "i8",
            ElementType::U16 => "u16",
            ElementType::I16 => "i16",
            ElementType::U32 => "u32",
            ElementType::I32 => "i32",
            ElementType::U64 => "u64",
            ElementType::I64 => "i64",
            ElementType::F32 => "f32",
            ElementType::F64 => "f64",
        }
    }

    /// Binary tag used by capture records and auxiliary blobs.
    pub const fn tag(self) -> u8 {
        match self {
            ElementType::U8 => 0,
            ElementType::I8 => 1,
            ElementType::U16 => 2,
            ElementType::I16 => 3,
            ElementType::U32 => 4,
            ElementType::I32 => 5,
            ElementType::U64 => 6,
            ElementType::I64 => 7,
            ElementType::F32 => 8,
            ElementType::F64 => 9,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Decode one little-endian element into an `f64`.
    ///
    /// `bytes` must be exactly [`ElementType::byte_width`] long.
    pub fn value_as_f64(self, bytes: &[u8]) -> f64 {
        match self {
            ElementType::U8 => u8::read_le(bytes).to_f64(),
            ElementType::I8 => i8::read_le(bytes).to_f64(),
            ElementType::U16 => u16::read_le(bytes).to_f64(),
            ElementType::I16 => i16::read_le(bytes).to_f64(),
            ElementType::U32 => u32::read_le(bytes).to_f64(),
            ElementType::I32 => i32::read_le(bytes).to_f64(),
            ElementType::U64 => u64::read_le(bytes).to_f64(),
            ElementType::I64 => i64::read_le(bytes).to_f64(),
            ElementType::F32 => f32::read_le(bytes).to_f64(),
            ElementType::F64 => f64::read_le(bytes).to_f64(),
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar types that can live in a [`FieldArray`].
pub trait Element: Copy + Send + Sync + 'static {
    const TYPE: ElementType;

    fn write_le(self, out: &mut Vec<u8>);

    /// `bytes` is exactly one element wide.
    fn read_le(bytes: &[u8]) -> Self;

    fn to_f64(self) -> f64;
}

macro_rules! impl_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const TYPE: ElementType = ElementType::$variant;

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }

                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_element! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
}

/// Classification of a field, mirroring how the sensor lays it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldClass {
    /// Full 2D raster (one value per beam per column)
    #[default]
    Pixel,
    /// One value per column
    Column,
    /// One value per packet
    Packet,
    /// One value per scan
    Scan,
}

/// Declaration of a sensor field. Immutable once captured from the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldType {
    /// Unique field name (e.g. "range")
    pub name: String,

    /// Element type of every value in the field
    pub element_type: ElementType,

    /// Shape of each element beyond the primary raster
    #[serde(default)]
    pub extra_dims: Vec<usize>,

    /// Raster vs. per-column/per-packet classification
    #[serde(default)]
    pub field_class: FieldClass,
}

impl FieldType {
    /// A pixel field without extra dimensions.
    pub fn new(name: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            name: name.into(),
            element_type,
            extra_dims: Vec::new(),
            field_class: FieldClass::Pixel,
        }
    }

    pub fn with_extra_dims(mut self, extra_dims: Vec<usize>) -> Self {
        self.extra_dims = extra_dims;
        self
    }

    pub fn with_class(mut self, field_class: FieldClass) -> Self {
        self.field_class = field_class;
        self
    }

    /// Number of byte planes this field decomposes into.
    pub fn channel_count(&self) -> usize {
        self.element_type.byte_width()
    }
}

/// A typed, shaped array of little-endian elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldArray {
    element_type: ElementType,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl FieldArray {
    /// Build an array from typed values.
    pub fn from_values<T: Element>(shape: Vec<usize>, values: &[T]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != values.len() {
            return Err(PclError::CorruptLayout(format!(
                "shape {shape:?} holds {expected} elements, got {}",
                values.len()
            )));
        }

        let mut bytes = Vec::with_capacity(values.len() * T::TYPE.byte_width());
        for value in values {
            value.write_le(&mut bytes);
        }

        Ok(Self {
            element_type: T::TYPE,
            shape,
            bytes,
        })
    }

    /// Build an array from little-endian element bytes.
    pub fn from_le_bytes(element_type: ElementType, shape: Vec<usize>, bytes: Vec<u8>) -> Result<Self> {
        let expected = shape.iter().product::<usize>() * element_type.byte_width();
        if expected != bytes.len() {
            return Err(PclError::CorruptLayout(format!(
                "{element_type} array of shape {shape:?} needs {expected} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            element_type,
            shape,
            bytes,
        })
    }

    pub fn zeros(element_type: ElementType, shape: Vec<usize>) -> Self {
        let len = shape.iter().product::<usize>() * element_type.byte_width();
        Self {
            element_type,
            shape,
            bytes: vec![0; len],
        }
    }

    /// Copy the elements out as `T`.
    pub fn to_values<T: Element>(&self) -> Result<Vec<T>> {
        if T::TYPE != self.element_type {
            return Err(PclError::TypeMismatch {
                expected: T::TYPE.name(),
                found: self.element_type.name(),
            });
        }
        Ok(self
            .bytes
            .chunks_exact(self.element_type.byte_width())
            .map(T::read_le)
            .collect())
    }

    /// Every element widened to `f64` (for fidelity metrics).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let element_type = self.element_type;
        self.bytes
            .chunks_exact(element_type.byte_width())
            .map(|chunk| element_type.value_as_f64(chunk))
            .collect()
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Little-endian element bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.element_type.byte_width()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Primary raster dimensions `(rows, cols)`.
    ///
    /// The first axis gives the rows; every remaining axis is folded into
    /// the columns. Arrays of rank 0 or 1 are a single row.
    pub fn raster_dims(&self) -> (usize, usize) {
        raster_dims(&self.shape)
    }
}

/// Primary raster dimensions of a shape, see [`FieldArray::raster_dims`].
pub fn raster_dims(shape: &[usize]) -> (usize, usize) {
    match shape {
        [] => (1, 1),
        [len] => (1, *len),
        [rows, rest @ ..] => (*rows, rest.iter().product()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_widths() {
        assert_eq!(ElementType::U8.byte_width(), 1);
        assert_eq!(ElementType::I16.byte_width(), 2);
        assert_eq!(ElementType::U32.byte_width(), 4);
        assert_eq!(ElementType::F32.byte_width(), 4);
        assert_eq!(ElementType::F64.byte_width(), 8);
    }

    #[test]
    fn test_tags_are_stable() {
        for ty in ElementType::ALL {
            assert_eq!(ElementType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(ElementType::from_tag(10), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&ElementType::U16).unwrap();
        assert_eq!(json, "\"u16\"");
        let field = FieldType::new("range", ElementType::U32).with_class(FieldClass::Pixel);
        let json = serde_json::to_string(&field).unwrap();
        assert!(json.contains("\"field_class\":\"pixel\""));
        let back: FieldType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn test_values_are_little_endian() {
        let array = FieldArray::from_values(vec![2], &[0x0102_0304u32, 0xAABB_CCDD]).unwrap();
        assert_eq!(array.as_bytes(), &[0x04, 0x03, 0x02, 0x01, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(array.to_values::<u32>().unwrap(), vec![0x0102_0304, 0xAABB_CCDD]);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let result = FieldArray::from_values(vec![2, 2], &[1u8, 2, 3]);
        assert!(matches!(result, Err(PclError::CorruptLayout(_))));

        let result = FieldArray::from_le_bytes(ElementType::U16, vec![3], vec![0; 5]);
        assert!(matches!(result, Err(PclError::CorruptLayout(_))));
    }

    #[test]
    fn test_type_mismatch() {
        let array = FieldArray::from_values(vec![1], &[1u16]).unwrap();
        let err = array.to_values::<u32>().unwrap_err();
        assert!(matches!(
            err,
            PclError::TypeMismatch {
                expected: "u32",
                found: "u16"
            }
        ));
    }

    #[test]
    fn test_raster_dims() {
        assert_eq!(raster_dims(&[]), (1, 1));
        assert_eq!(raster_dims(&[16]), (1, 16));
        assert_eq!(raster_dims(&[128, 1024]), (128, 1024));
        assert_eq!(raster_dims(&[4, 4]), (4, 4));
        assert_eq!(raster_dims(&[2, 3, 4]), (2, 12));
    }

    #[test]
    fn test_f64_widening() {
        let array = FieldArray::from_values(vec![3], &[-1i16, 0, 300]).unwrap();
        assert_eq!(array.to_f64_vec(), vec![-1.0, 0.0, 300.0]);
        let array = FieldArray::from_values(vec![1], &[1.5f32]).unwrap();
        assert_eq!(array.to_f64_vec(), vec![1.5]);
    }
}

//! Core types: element kinds, tagged pixel buffers and coordinates.

use std::fmt;

use serde::{Deserialize, Serialize};
use zarrs::array::{DataType, Element, ElementOwned};

use crate::error::{CompositorError, Result};

/// Chunk edge length shared by rows and columns at every output level.
pub const CHUNK_SIZE: u64 = 1024;

/// The ten numeric element kinds a plate may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl ElementType {
    pub const ALL: [ElementType; 10] = [
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Float32,
        Self::Float64,
    ];

    /// Run-wide numeric code for this element type.
    pub fn code(&self) -> u16 {
        match self {
            Self::UInt8 => 1,
            Self::UInt16 => 2,
            Self::UInt32 => 4,
            Self::UInt64 => 8,
            Self::Int8 => 16,
            Self::Int16 => 32,
            Self::Int32 => 64,
            Self::Int64 => 128,
            Self::Float32 => 256,
            Self::Float64 => 512,
        }
    }

    /// Look up an element type by its run-wide code.
    pub fn from_code(code: u16) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or_else(|| CompositorError::UnsupportedElementType(format!("code {}", code)))
    }

    /// Canonical lowercase name (`uint16`, `float32`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Parse a name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| CompositorError::UnsupportedElementType(name.to_string()))
    }

    /// Size of one element in bytes.
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::UInt16 | Self::Int16 => 2,
            Self::UInt32 | Self::Int32 | Self::Float32 => 4,
            Self::UInt64 | Self::Int64 | Self::Float64 => 8,
        }
    }

    /// Pixel type name used by OME-XML.
    pub fn ome_pixel_type(&self) -> &'static str {
        match self {
            Self::Float32 => "float",
            Self::Float64 => "double",
            other => other.name(),
        }
    }

    /// The zarrs data type for this element type.
    pub fn to_zarr(&self) -> DataType {
        match self {
            Self::UInt8 => DataType::UInt8,
            Self::UInt16 => DataType::UInt16,
            Self::UInt32 => DataType::UInt32,
            Self::UInt64 => DataType::UInt64,
            Self::Int8 => DataType::Int8,
            Self::Int16 => DataType::Int16,
            Self::Int32 => DataType::Int32,
            Self::Int64 => DataType::Int64,
            Self::Float32 => DataType::Float32,
            Self::Float64 => DataType::Float64,
        }
    }

    /// Map a zarrs data type onto a supported element type.
    pub fn from_zarr(data_type: &DataType) -> Result<Self> {
        match data_type {
            DataType::UInt8 => Ok(Self::UInt8),
            DataType::UInt16 => Ok(Self::UInt16),
            DataType::UInt32 => Ok(Self::UInt32),
            DataType::UInt64 => Ok(Self::UInt64),
            DataType::Int8 => Ok(Self::Int8),
            DataType::Int16 => Ok(Self::Int16),
            DataType::Int32 => Ok(Self::Int32),
            DataType::Int64 => Ok(Self::Int64),
            DataType::Float32 => Ok(Self::Float32),
            DataType::Float64 => Ok(Self::Float64),
            other => Err(CompositorError::UnsupportedElementType(format!(
                "{:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Run `$body` with `$T` bound to the Rust type of `$element_type`.
macro_rules! dispatch_element_type {
    ($element_type:expr, $T:ident => $body:expr) => {{
        use $crate::types::ElementType as DispatchedType;
        match $element_type {
            DispatchedType::UInt8 => {
                type $T = u8;
                $body
            }
            DispatchedType::UInt16 => {
                type $T = u16;
                $body
            }
            DispatchedType::UInt32 => {
                type $T = u32;
                $body
            }
            DispatchedType::UInt64 => {
                type $T = u64;
                $body
            }
            DispatchedType::Int8 => {
                type $T = i8;
                $body
            }
            DispatchedType::Int16 => {
                type $T = i16;
                $body
            }
            DispatchedType::Int32 => {
                type $T = i32;
                $body
            }
            DispatchedType::Int64 => {
                type $T = i64;
                $body
            }
            DispatchedType::Float32 => {
                type $T = f32;
                $body
            }
            DispatchedType::Float64 => {
                type $T = f64;
                $body
            }
        }
    }};
}

pub(crate) use dispatch_element_type;

/// A numeric element that can live in an [`ImageData`] buffer.
pub trait PixelElement:
    Element + ElementOwned + bytemuck::Pod + Default + Send + Sync + 'static
{
    const ELEMENT_TYPE: ElementType;

    /// Borrow the typed contents if `data` holds this element type.
    fn slice_of(data: &ImageData) -> Option<&[Self]>;
}

/// Pixel buffer tagged with its element type.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! impl_pixel_element {
    ($($t:ty => $variant:ident),+ $(,)?) => {
        $(
            impl PixelElement for $t {
                const ELEMENT_TYPE: ElementType = ElementType::$variant;

                fn slice_of(data: &ImageData) -> Option<&[Self]> {
                    match data {
                        ImageData::$variant(v) => Some(v.as_slice()),
                        _ => None,
                    }
                }
            }

            impl From<Vec<$t>> for ImageData {
                fn from(v: Vec<$t>) -> Self {
                    ImageData::$variant(v)
                }
            }
        )+
    };
}

impl_pixel_element!(
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
);

/// Run `$body` with `$v` bound to the inner vector of an [`ImageData`].
macro_rules! with_image_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ImageData::UInt8($v) => $body,
            ImageData::UInt16($v) => $body,
            ImageData::UInt32($v) => $body,
            ImageData::UInt64($v) => $body,
            ImageData::Int8($v) => $body,
            ImageData::Int16($v) => $body,
            ImageData::Int32($v) => $body,
            ImageData::Int64($v) => $body,
            ImageData::Float32($v) => $body,
            ImageData::Float64($v) => $body,
        }
    };
}

/// Contiguous element run copied between two flat buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRun {
    /// Offset into the source buffer.
    pub src: usize,
    /// Offset into the destination buffer.
    pub dst: usize,
    /// Number of elements.
    pub len: usize,
}

fn copy_runs<T: Copy>(dst: &mut [T], src: &[T], runs: &[CopyRun]) -> Result<()> {
    for run in runs {
        if run.src + run.len > src.len() || run.dst + run.len > dst.len() {
            return Err(CompositorError::out_of_bounds(
                format!("run {:?}", run),
                format!("source {} / destination {} elements", src.len(), dst.len()),
            ));
        }
        dst[run.dst..run.dst + run.len].copy_from_slice(&src[run.src..run.src + run.len]);
    }
    Ok(())
}

impl ImageData {
    /// A zero-filled buffer of `len` elements.
    pub fn zeros(element_type: ElementType, len: usize) -> Self {
        dispatch_element_type!(element_type, T => ImageData::from(vec![T::default(); len]))
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Self::UInt8(_) => ElementType::UInt8,
            Self::UInt16(_) => ElementType::UInt16,
            Self::UInt32(_) => ElementType::UInt32,
            Self::UInt64(_) => ElementType::UInt64,
            Self::Int8(_) => ElementType::Int8,
            Self::Int16(_) => ElementType::Int16,
            Self::Int32(_) => ElementType::Int32,
            Self::Int64(_) => ElementType::Int64,
            Self::Float32(_) => ElementType::Float32,
            Self::Float64(_) => ElementType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        with_image_data!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the buffer in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len() * self.element_type().size_bytes()
    }

    /// Native-endian byte view of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        with_image_data!(self, v => bytemuck::cast_slice(v.as_slice()))
    }

    /// Typed view, `None` if `T` is not this buffer's element type.
    pub fn as_slice<T: PixelElement>(&self) -> Option<&[T]> {
        T::slice_of(self)
    }

    /// New buffer holding the elements at `indices`, in order.
    pub fn gather(&self, indices: &[usize]) -> Result<ImageData> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(CompositorError::out_of_bounds(
                format!("element {}", bad),
                format!("{} elements", self.len()),
            ));
        }
        Ok(with_image_data!(self, v => {
            ImageData::from(indices.iter().map(|&i| v[i]).collect::<Vec<_>>())
        }))
    }

    /// Copy element runs from `src` into this buffer.
    ///
    /// Both buffers must share an element type.
    pub fn copy_runs_from(&mut self, src: &ImageData, runs: &[CopyRun]) -> Result<()> {
        let expected = self.element_type();
        let found = src.element_type();
        match (self, src) {
            (Self::UInt8(d), Self::UInt8(s)) => copy_runs(d, s, runs),
            (Self::UInt16(d), Self::UInt16(s)) => copy_runs(d, s, runs),
            (Self::UInt32(d), Self::UInt32(s)) => copy_runs(d, s, runs),
            (Self::UInt64(d), Self::UInt64(s)) => copy_runs(d, s, runs),
            (Self::Int8(d), Self::Int8(s)) => copy_runs(d, s, runs),
            (Self::Int16(d), Self::Int16(s)) => copy_runs(d, s, runs),
            (Self::Int32(d), Self::Int32(s)) => copy_runs(d, s, runs),
            (Self::Int64(d), Self::Int64(s)) => copy_runs(d, s, runs),
            (Self::Float32(d), Self::Float32(s)) => copy_runs(d, s, runs),
            (Self::Float64(d), Self::Float64(s)) => copy_runs(d, s, runs),
            _ => Err(CompositorError::ElementTypeMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            }),
        }
    }
}

/// Identifier of one source well array within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WellId(pub u32);

impl fmt::Display for WellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Address of one chunk-sized write target in the output pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub level: usize,
    pub channel: u64,
    pub y_index: u64,
    pub x_index: u64,
}

impl ChunkCoord {
    pub fn new(level: usize, channel: u64, y_index: u64, x_index: u64) -> Self {
        Self {
            level,
            channel,
            y_index,
            x_index,
        }
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(level {}, channel {}, y {}, x {})",
            self.level, self.channel, self.y_index, self.x_index
        )
    }
}

/// Result of a single `write_chunk` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The chunk was assembled and written.
    Written,
    /// The chunk was already complete; nothing was read or written.
    AlreadyWritten,
}

/// Totals for a batch of chunk writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub skipped: usize,
}

impl WriteSummary {
    pub fn record(&mut self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written => self.written += 1,
            WriteOutcome::AlreadyWritten => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.written + self.skipped
    }
}

/// Statistics about the well buffer cache.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub memory_bytes: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_codes() {
        assert_eq!(ElementType::from_code(1).unwrap(), ElementType::UInt8);
        assert_eq!(ElementType::from_code(512).unwrap(), ElementType::Float64);
        for t in ElementType::ALL {
            assert_eq!(ElementType::from_code(t.code()).unwrap(), t);
            assert_eq!(ElementType::from_name(t.name()).unwrap(), t);
            assert_eq!(ElementType::from_zarr(&t.to_zarr()).unwrap(), t);
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        for code in [0u16, 3, 1024, u16::MAX] {
            let err = ElementType::from_code(code).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        }
        assert!(ElementType::from_name("complex64").is_err());
        assert!(ElementType::from_zarr(&DataType::Bool).is_err());
    }

    #[test]
    fn test_zeros_have_requested_type() {
        for t in ElementType::ALL {
            let data = ImageData::zeros(t, 6);
            assert_eq!(data.element_type(), t);
            assert_eq!(data.len(), 6);
            assert_eq!(data.size_bytes(), 6 * t.size_bytes());
            assert!(data.as_bytes().iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_copy_runs() {
        let src = ImageData::from(vec![1u16, 2, 3, 4, 5, 6]);
        let mut dst = ImageData::zeros(ElementType::UInt16, 8);
        dst.copy_runs_from(
            &src,
            &[
                CopyRun { src: 0, dst: 1, len: 2 },
                CopyRun { src: 4, dst: 5, len: 2 },
            ],
        )
        .unwrap();
        assert_eq!(dst.as_slice::<u16>().unwrap(), &[0, 1, 2, 0, 0, 5, 6, 0]);
    }

    #[test]
    fn test_copy_runs_type_mismatch() {
        let src = ImageData::from(vec![1u8, 2]);
        let mut dst = ImageData::zeros(ElementType::Float32, 2);
        let err = dst
            .copy_runs_from(&src, &[CopyRun { src: 0, dst: 0, len: 2 }])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_copy_runs_out_of_bounds() {
        let src = ImageData::from(vec![1i32, 2]);
        let mut dst = ImageData::zeros(ElementType::Int32, 2);
        assert!(dst
            .copy_runs_from(&src, &[CopyRun { src: 1, dst: 0, len: 2 }])
            .is_err());
    }

    #[test]
    fn test_gather() {
        let data = ImageData::from(vec![10.0f64, 11.0, 12.0, 13.0]);
        let picked = data.gather(&[3, 1]).unwrap();
        assert_eq!(picked.as_slice::<f64>().unwrap(), &[13.0, 11.0]);
        assert!(data.gather(&[4]).is_err());
    }

    #[test]
    fn test_as_slice_wrong_type() {
        let data = ImageData::from(vec![1u8, 2, 3]);
        assert!(data.as_slice::<u16>().is_none());
        assert_eq!(data.as_slice::<u8>().unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_write_summary() {
        let mut summary = WriteSummary::default();
        summary.record(WriteOutcome::Written);
        summary.record(WriteOutcome::AlreadyWritten);
        summary.record(WriteOutcome::Written);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total(), 3);
    }
}

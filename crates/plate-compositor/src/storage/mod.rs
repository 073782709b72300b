//! Boundary to the chunked array storage engine.
//!
//! The compositor never touches on-disk layout itself; everything goes
//! through [`ArrayStorage`]. [`ZarrStorage`] is the production engine.

mod zarr;

pub use zarr::ZarrStorage;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::range::Range;
use crate::types::{ElementType, ImageData};

/// An opened array: its location, full shape and element type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayHandle {
    location: String,
    shape: Vec<u64>,
    element_type: ElementType,
}

impl ArrayHandle {
    pub fn new(location: impl Into<String>, shape: Vec<u64>, element_type: ElementType) -> Self {
        Self {
            location: location.into(),
            shape,
            element_type,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
}

/// Declaration of an array to be created.
#[derive(Debug, Clone)]
pub struct ArraySpec {
    pub shape: Vec<u64>,
    pub chunk_shape: Vec<u64>,
    pub element_type: ElementType,
    pub attributes: Map<String, Value>,
}

/// Chunked n-dimensional array storage engine.
///
/// Region reads and writes take one unit-step range per dimension.
pub trait ArrayStorage: Send + Sync {
    /// Open an existing array, reading its shape and element type.
    fn open(&self, location: &str) -> Result<ArrayHandle>;

    /// Create (or overwrite) an array and its metadata.
    fn create(&self, location: &str, spec: &ArraySpec) -> Result<ArrayHandle>;

    /// Read a rectangular region.
    fn read_region(&self, handle: &ArrayHandle, ranges: &[Range]) -> Result<ImageData>;

    /// Write a rectangular region.
    fn write_region(&self, handle: &ArrayHandle, ranges: &[Range], data: &ImageData) -> Result<()>;

    /// Attributes of the group at `location`.
    fn group_attributes(&self, location: &str) -> Result<Map<String, Value>>;

    /// Create a group at `location` with the given attributes.
    fn create_group(&self, location: &str, attributes: Map<String, Value>) -> Result<()>;

    /// Store an opaque object under `key`.
    fn put_object(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

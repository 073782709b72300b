//! Zarr V3 storage engine backed by `zarrs`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use tracing::debug;
use zarrs::array::codec::bytes_to_bytes::blosc::{
    BloscCodec, BloscCompressionLevel, BloscCompressor, BloscShuffleMode,
};
use zarrs::array::{Array, ArrayBuilder, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::{Group, GroupBuilder};
use zarrs::storage::{ReadableWritableStorageTraits, StoreKey, WritableStorageTraits};
use zarrs_filesystem::FilesystemStore;

use crate::config::{CompositorConfig, ZarrCompression};
use crate::error::{CompositorError, Result};
use crate::range::{format_ranges, Range};
use crate::types::{dispatch_element_type, ElementType, ImageData};

use super::{ArrayHandle, ArraySpec, ArrayStorage};

/// Zarr node path for a location (`a/b` -> `/a/b`, `` -> `/`).
fn node_path(location: &str) -> String {
    format!("/{}", location.trim_matches('/'))
}

/// Array storage over any readable and writable zarrs store.
///
/// Opened arrays are kept so repeated region reads and writes on the same
/// location do not re-read metadata.
pub struct ZarrStorage<S: ?Sized> {
    store: Arc<S>,
    arrays: RwLock<HashMap<String, Arc<Array<S>>>>,
    compression: ZarrCompression,
    compression_level: u8,
    shuffle: bool,
}

impl ZarrStorage<FilesystemStore> {
    /// Storage rooted at a filesystem directory, created if missing.
    pub fn filesystem(root: impl AsRef<Path>, config: &CompositorConfig) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let store = FilesystemStore::new(root).map_err(CompositorError::storage_error)?;
        Ok(Self::new(Arc::new(store), config))
    }
}

impl<S: ReadableWritableStorageTraits + ?Sized + 'static> ZarrStorage<S> {
    /// Wrap a store; output codecs come from `config`.
    pub fn new(store: Arc<S>, config: &CompositorConfig) -> Self {
        Self {
            store,
            arrays: RwLock::new(HashMap::new()),
            compression: config.compression,
            compression_level: config.compression_level,
            shuffle: config.shuffle,
        }
    }

    fn cached(&self, location: &str) -> Option<Arc<Array<S>>> {
        let arrays = self.arrays.read().unwrap_or_else(|e| e.into_inner());
        arrays.get(location).cloned()
    }

    fn remember(&self, location: &str, array: Arc<Array<S>>) {
        let mut arrays = self.arrays.write().unwrap_or_else(|e| e.into_inner());
        arrays.insert(location.to_string(), array);
    }

    fn open_array(&self, location: &str) -> Result<Arc<Array<S>>> {
        let array = Array::open(self.store.clone(), &node_path(location))
            .map_err(|e| CompositorError::open_failed(location, e))?;
        let array = Arc::new(array);
        self.remember(location, array.clone());
        Ok(array)
    }

    fn array(&self, location: &str) -> Result<Arc<Array<S>>> {
        match self.cached(location) {
            Some(array) => Ok(array),
            None => self.open_array(location),
        }
    }

    /// Build the subset for a region, checking dimensionality, steps and bounds.
    fn subset(&self, handle: &ArrayHandle, ranges: &[Range]) -> Result<ArraySubset> {
        let requested = format_ranges(ranges);
        let bounds = format!("{:?}", handle.shape());
        if ranges.len() != handle.ndim() {
            return Err(CompositorError::out_of_bounds(requested, bounds));
        }
        if ranges.iter().any(|r| !r.is_unit_step()) {
            return Err(CompositorError::InvalidRange(format!(
                "storage regions need unit steps, got {}",
                requested
            )));
        }
        let fits = ranges
            .iter()
            .zip(handle.shape())
            .all(|(r, &extent)| r.fits_within(extent));
        if !fits {
            return Err(CompositorError::out_of_bounds(requested, bounds));
        }

        let start: Vec<u64> = ranges.iter().map(|r| r.to_std().start).collect();
        let shape: Vec<u64> = ranges.iter().map(|r| r.len()).collect();
        ArraySubset::new_with_start_shape(start, shape)
            .map_err(|e| CompositorError::InvalidRange(e.to_string()))
    }

    /// Create the compression codec based on configuration.
    fn create_compression_codec(
        &self,
        element_type: ElementType,
    ) -> Result<Arc<dyn zarrs::array::codec::BytesToBytesCodecTraits>> {
        let level = BloscCompressionLevel::try_from(self.compression_level)
            .map_err(|_| CompositorError::config("Invalid compression level"))?;

        let shuffle = if self.shuffle {
            BloscShuffleMode::Shuffle
        } else {
            BloscShuffleMode::NoShuffle
        };

        // typesize is required when shuffle is enabled
        let typesize = if self.shuffle {
            Some(element_type.size_bytes())
        } else {
            None
        };

        let compressor = match self.compression {
            ZarrCompression::None => {
                return Err(CompositorError::config("No compression configured"));
            }
            ZarrCompression::BloscLz4 => BloscCompressor::LZ4,
            ZarrCompression::BloscZstd => BloscCompressor::Zstd,
        };

        let codec = BloscCodec::new(compressor, level, None, shuffle, typesize)
            .map_err(|e| CompositorError::config(e.to_string()))?;

        Ok(Arc::new(codec))
    }
}

impl<S: ReadableWritableStorageTraits + ?Sized + 'static> ArrayStorage for ZarrStorage<S> {
    fn open(&self, location: &str) -> Result<ArrayHandle> {
        let array = self.open_array(location)?;
        let element_type = ElementType::from_zarr(array.data_type())?;
        debug!(location, shape = ?array.shape(), %element_type, "Opened array");
        Ok(ArrayHandle::new(location, array.shape().to_vec(), element_type))
    }

    fn create(&self, location: &str, spec: &ArraySpec) -> Result<ArrayHandle> {
        if spec.shape.len() != spec.chunk_shape.len() {
            return Err(CompositorError::config(format!(
                "chunk shape {:?} does not match array shape {:?}",
                spec.chunk_shape, spec.shape
            )));
        }

        let chunk_grid: zarrs::array::ChunkGrid = spec
            .chunk_shape
            .clone()
            .try_into()
            .map_err(|e| CompositorError::config(format!("{:?}", e)))?;

        let mut binding = ArrayBuilder::new(
            spec.shape.clone(),
            spec.element_type.to_zarr(),
            chunk_grid,
            FillValue::new(vec![0u8; spec.element_type.size_bytes()]),
        );
        let mut builder = binding.attributes(spec.attributes.clone());

        if self.compression != ZarrCompression::None {
            let codec = self.create_compression_codec(spec.element_type)?;
            builder = builder.bytes_to_bytes_codecs(vec![codec]);
        }

        let array = builder
            .build(self.store.clone(), &node_path(location))
            .map_err(|e| CompositorError::write_failed(location, e))?;

        array
            .store_metadata()
            .map_err(|e| CompositorError::write_failed(location, e))?;

        debug!(location, shape = ?spec.shape, element_type = %spec.element_type, "Created array");
        self.remember(location, Arc::new(array));
        Ok(ArrayHandle::new(location, spec.shape.clone(), spec.element_type))
    }

    fn read_region(&self, handle: &ArrayHandle, ranges: &[Range]) -> Result<ImageData> {
        let subset = self.subset(handle, ranges)?;
        let array = self.array(handle.location())?;

        dispatch_element_type!(handle.element_type(), T => {
            let data: Vec<T> = array
                .retrieve_array_subset_elements(&subset)
                .map_err(|e| CompositorError::read_failed(handle.location(), e))?;
            Ok(ImageData::from(data))
        })
    }

    fn write_region(&self, handle: &ArrayHandle, ranges: &[Range], data: &ImageData) -> Result<()> {
        if data.element_type() != handle.element_type() {
            return Err(CompositorError::ElementTypeMismatch {
                expected: handle.element_type().to_string(),
                found: data.element_type().to_string(),
            });
        }
        let subset = self.subset(handle, ranges)?;
        if subset.num_elements() != data.len() as u64 {
            return Err(CompositorError::write_failed(
                handle.location(),
                format!(
                    "buffer holds {} elements but region {} needs {}",
                    data.len(),
                    format_ranges(ranges),
                    subset.num_elements()
                ),
            ));
        }
        let array = self.array(handle.location())?;

        dispatch_element_type!(handle.element_type(), T => {
            let elements = data.as_slice::<T>().ok_or_else(|| {
                CompositorError::write_failed(handle.location(), "buffer type changed")
            })?;
            array
                .store_array_subset_elements(&subset, elements)
                .map_err(|e| CompositorError::write_failed(handle.location(), e))
        })
    }

    fn group_attributes(&self, location: &str) -> Result<Map<String, Value>> {
        let group = Group::open(self.store.clone(), &node_path(location))
            .map_err(|e| CompositorError::open_failed(location, e))?;
        Ok(group.attributes().clone())
    }

    fn create_group(&self, location: &str, attributes: Map<String, Value>) -> Result<()> {
        let group = GroupBuilder::new()
            .attributes(attributes)
            .build(self.store.clone(), &node_path(location))
            .map_err(|e| CompositorError::write_failed(location, e))?;
        group
            .store_metadata()
            .map_err(|e| CompositorError::write_failed(location, e))
    }

    fn put_object(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let store_key = StoreKey::new(key.trim_start_matches('/'))
            .map_err(|e| CompositorError::write_failed(key, e))?;
        self.store
            .set(&store_key, bytes::Bytes::from(value))
            .map_err(|e| CompositorError::write_failed(key, e))
    }
}

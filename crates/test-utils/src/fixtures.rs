//! Well pyramid fixtures for plate composition tests.
//!
//! Wells are written the way an upstream pyramid writer lays them out:
//!
//! ```text
//! <root>/data.zarr/0/          group with OME-NGFF multiscales
//! <root>/data.zarr/0/<level>   array [t, c, z, y, x]
//! ```

use std::path::Path;
use std::sync::Arc;

use zarrs::array::{ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

use crate::generators::create_well_pixels;

/// Open (creating if needed) a filesystem store at `path`.
pub fn open_store(path: &Path) -> anyhow::Result<Arc<FilesystemStore>> {
    std::fs::create_dir_all(path)?;
    Ok(Arc::new(FilesystemStore::new(path)?))
}

/// Write a whole array at `location` in one call.
///
/// # Arguments
/// * `store` - Target store
/// * `location` - Array path relative to the store root
/// * `shape` - Array shape
/// * `chunk_shape` - Chunk shape (same rank as `shape`)
/// * `data_type` - Zarr data type matching `T`
/// * `data` - Elements in row-major order
pub fn write_array<T: Element>(
    store: &Arc<FilesystemStore>,
    location: &str,
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
    data_type: DataType,
    data: &[T],
) -> anyhow::Result<()> {
    let fill_value = FillValue::new(vec![0u8; std::mem::size_of::<T>()]);
    let chunk_grid: zarrs::array::ChunkGrid = chunk_shape
        .try_into()
        .map_err(|e| anyhow::anyhow!("invalid chunk shape: {:?}", e))?;
    let array = ArrayBuilder::new(shape.clone(), data_type, chunk_grid, fill_value)
        .build(store.clone(), &format!("/{}", location.trim_matches('/')))?;

    array.store_metadata()?;

    let subset = ArraySubset::new_with_start_shape(vec![0; shape.len()], shape)?;
    array.store_array_subset_elements(&subset, data)?;

    Ok(())
}

/// Declaration of a synthetic well pyramid.
#[derive(Debug, Clone)]
pub struct WellSpec {
    /// Encoded into every pixel value, see [`crate::pixel_value`].
    pub seed: u32,
    pub channels: u64,
    pub planes: u64,
    pub timesteps: u64,
    /// `(rows, cols)` per level, level 0 first.
    pub level_shapes: Vec<(u64, u64)>,
}

impl WellSpec {
    /// Single-channel, single-plane well with one level per shape.
    pub fn new(seed: u32, level_shapes: &[(u64, u64)]) -> Self {
        Self {
            seed,
            channels: 1,
            planes: 1,
            timesteps: 1,
            level_shapes: level_shapes.to_vec(),
        }
    }

    pub fn with_channels(mut self, channels: u64) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_planes(mut self, planes: u64) -> Self {
        self.planes = planes;
        self
    }

    pub fn with_timesteps(mut self, timesteps: u64) -> Self {
        self.timesteps = timesteps;
        self
    }

    /// Array shape `[t, c, z, y, x]` at `level`.
    pub fn shape(&self, level: usize) -> [u64; 5] {
        let (rows, cols) = self.level_shapes[level];
        [self.timesteps, self.channels, self.planes, rows, cols]
    }
}

/// Write a `uint32` well pyramid under `root` with multiscales attributes.
///
/// Arrays are chunked in 16x16 tiles so reads cross chunk boundaries.
pub fn write_well_pyramid(
    store: &Arc<FilesystemStore>,
    root: &str,
    spec: &WellSpec,
) -> anyhow::Result<()> {
    let root = root.trim_matches('/');

    for level in 0..spec.level_shapes.len() {
        let shape = spec.shape(level);
        let data = create_well_pixels(spec.seed, shape);
        write_array(
            store,
            &format!("{}/data.zarr/0/{}", root, level),
            shape.to_vec(),
            vec![1, 1, 1, 16, 16],
            DataType::UInt32,
            &data,
        )?;
    }

    let datasets: Vec<serde_json::Value> = (0..spec.level_shapes.len())
        .map(|level| serde_json::json!({ "path": level.to_string() }))
        .collect();

    let mut attrs = serde_json::Map::new();
    attrs.insert(
        "multiscales".to_string(),
        serde_json::json!([{ "version": "0.4", "datasets": datasets }]),
    );

    GroupBuilder::new()
        .attributes(attrs)
        .build(store.clone(), &format!("/{}/data.zarr/0", root))?
        .store_metadata()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zarrs::array::Array;

    #[test]
    fn test_write_well_pyramid() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = open_store(temp_dir.path()).expect("Failed to open store");

        let spec = WellSpec::new(7, &[(20, 30), (10, 15)]).with_channels(2);
        write_well_pyramid(&store, "wells/A01", &spec).expect("Failed to write well");

        let array = Array::open(store.clone(), "/wells/A01/data.zarr/0/1").expect("Failed to open");
        assert_eq!(array.shape(), &[1, 2, 1, 10, 15]);

        let subset = ArraySubset::new_with_start_shape(vec![0, 1, 0, 2, 3], vec![1, 1, 1, 1, 1])
            .expect("subset");
        let value: Vec<u32> = array
            .retrieve_array_subset_elements(&subset)
            .expect("Failed to read");
        assert_eq!(value, vec![crate::pixel_value(7, 1, 2, 3)]);
    }
}

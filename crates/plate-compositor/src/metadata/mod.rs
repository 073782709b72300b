//! Sidecar metadata for the plate pyramid.
//!
//! Layout of the output tree:
//!
//! ```text
//! data.zarr/                  group, bioformats2raw.layout = 3
//! ├── 0/                      group, OME-NGFF multiscales
//! │   ├── 0                   level 0 array [t, c, z, y, x]
//! │   ├── 1                   level 1 array
//! │   └── ...
//! └── OME/                    group, series = ["0"]
//!     └── METADATA.ome.xml
//! ```

mod ome_xml;

pub use ome_xml::{OmeChannel, OmeDocument, OmeImage, OmePixels};

use serde_json::{json, Map, Value};
use tracing::info;

use crate::composition::PyramidParameters;
use crate::error::Result;
use crate::storage::ArrayStorage;

/// Root group of the output tree.
pub const ROOT_GROUP: &str = "data.zarr";

/// Group holding one array per pyramid level.
pub const IMAGE_GROUP: &str = "data.zarr/0";

/// Group holding the OME-XML sidecar.
pub const OME_GROUP: &str = "data.zarr/OME";

/// Storage key of the OME-XML sidecar.
pub const OME_XML_KEY: &str = "data.zarr/OME/METADATA.ome.xml";

/// Location of the output array for `level`.
pub fn output_location(level: usize) -> String {
    format!("{}/{}", IMAGE_GROUP, level)
}

/// Writes group declarations, multiscales attributes and OME-XML.
pub struct MetadataEmitter<'a> {
    storage: &'a dyn ArrayStorage,
    params: &'a PyramidParameters,
    image_name: &'a str,
}

impl<'a> MetadataEmitter<'a> {
    pub fn new(
        storage: &'a dyn ArrayStorage,
        params: &'a PyramidParameters,
        image_name: &'a str,
    ) -> Self {
        Self {
            storage,
            params,
            image_name,
        }
    }

    /// Write every sidecar file.
    pub fn emit(&self) -> Result<()> {
        self.create_zgroup_files()?;
        self.create_zattr_file()?;
        self.create_xml()?;
        info!(
            levels = self.params.num_levels(),
            image = self.image_name,
            "Wrote plate metadata"
        );
        Ok(())
    }

    /// Declare the root, image and OME groups.
    ///
    /// A Zarr V3 group document holds its declaration and attributes
    /// together, so the image group is always declared with its multiscales.
    pub fn create_zgroup_files(&self) -> Result<()> {
        let mut root = Map::new();
        root.insert("bioformats2raw.layout".to_string(), json!(3));
        self.storage.create_group(ROOT_GROUP, root)?;

        self.storage.create_group(IMAGE_GROUP, self.image_attributes()?)?;

        let mut ome = Map::new();
        ome.insert("series".to_string(), json!(["0"]));
        self.storage.create_group(OME_GROUP, ome)
    }

    /// Write the multiscales attributes of the image group.
    pub fn create_zattr_file(&self) -> Result<()> {
        self.storage
            .create_group(IMAGE_GROUP, self.image_attributes()?)
    }

    /// Write the OME-XML sidecar.
    pub fn create_xml(&self) -> Result<()> {
        let xml = OmeDocument::for_plate(self.params, self.image_name)?.to_xml()?;
        self.storage.put_object(OME_XML_KEY, xml.into_bytes())
    }

    /// Attributes of the image group: OME-NGFF multiscales plus the
    /// per-level plate geometry.
    pub fn image_attributes(&self) -> Result<Map<String, Value>> {
        let params = self.params;

        let datasets: Vec<Value> = params
            .levels
            .iter()
            .map(|geometry| {
                let factor = (1u64 << geometry.level) as f64;
                json!({
                    "path": geometry.level.to_string(),
                    "coordinateTransformations": [
                        {"type": "scale", "scale": [1.0, 1.0, 1.0, factor, factor]}
                    ]
                })
            })
            .collect();

        let mut levels = Vec::with_capacity(params.num_levels());
        for geometry in &params.levels {
            levels.push(json!({
                "level": geometry.level,
                "shape": params.output_shape(geometry.level)?,
                "chunks": params.output_chunk_shape(),
                "grid": [geometry.grid.0, geometry.grid.1],
                "tile_shape": [geometry.tile_shape.0, geometry.tile_shape.1],
            }));
        }

        let mut attrs = Map::new();
        attrs.insert(
            "multiscales".to_string(),
            json!([{
                "version": "0.4",
                "name": self.image_name,
                "axes": [
                    {"name": "t", "type": "time"},
                    {"name": "c", "type": "channel"},
                    {"name": "z", "type": "space"},
                    {"name": "y", "type": "space"},
                    {"name": "x", "type": "space"}
                ],
                "datasets": datasets,
                "metadata": {"method": "mean"}
            }]),
        );
        attrs.insert(
            "plate_composition".to_string(),
            json!({
                "element_type": params.element_type.name(),
                "element_type_code": params.element_type_code(),
                "channels": params.channels,
                "chunk_size": params.chunk_size,
                "levels": levels,
            }),
        );
        Ok(attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axes::AxisLayout;
    use crate::composition::LevelGeometry;
    use crate::config::CompositorConfig;
    use crate::storage::ZarrStorage;
    use crate::types::ElementType;
    use std::sync::Arc;
    use zarrs::storage::store::MemoryStore;

    #[test]
    fn test_output_location() {
        assert_eq!(output_location(0), "data.zarr/0/0");
        assert_eq!(output_location(3), "data.zarr/0/3");
    }

    fn sample_params() -> PyramidParameters {
        PyramidParameters {
            levels: vec![
                LevelGeometry {
                    level: 0,
                    grid: (1, 2),
                    tile_shape: (64, 64),
                    plate_shape: (64, 128),
                },
                LevelGeometry {
                    level: 1,
                    grid: (1, 2),
                    tile_shape: (32, 32),
                    plate_shape: (32, 64),
                },
            ],
            channels: 2,
            layout: AxisLayout::TCZYX,
            element_type: ElementType::UInt16,
            chunk_size: 32,
        }
    }

    fn memory_storage() -> ZarrStorage<MemoryStore> {
        ZarrStorage::new(Arc::new(MemoryStore::new()), &CompositorConfig::default())
    }

    #[test]
    fn test_image_attributes() {
        let storage = memory_storage();
        let params = sample_params();
        let attrs = MetadataEmitter::new(&storage, &params, "plate")
            .image_attributes()
            .unwrap();

        let datasets = &attrs["multiscales"][0]["datasets"];
        assert_eq!(datasets.as_array().map(Vec::len), Some(2));
        assert_eq!(datasets[1]["path"], "1");
        assert_eq!(
            datasets[1]["coordinateTransformations"][0]["scale"],
            json!([1.0, 1.0, 1.0, 2.0, 2.0])
        );
        assert_eq!(attrs["plate_composition"]["element_type"], "uint16");
        assert_eq!(
            attrs["plate_composition"]["levels"][1]["shape"],
            json!([1, 2, 1, 32, 64])
        );
    }

    #[test]
    fn test_group_declarations_keep_multiscales_in_any_order() {
        let storage = memory_storage();
        let params = sample_params();
        let emitter = MetadataEmitter::new(&storage, &params, "plate");

        emitter.create_zattr_file().unwrap();
        emitter.create_zgroup_files().unwrap();
        let image = storage.group_attributes(IMAGE_GROUP).unwrap();
        assert_eq!(image["multiscales"][0]["name"], "plate");
        assert_eq!(
            storage.group_attributes(ROOT_GROUP).unwrap()["bioformats2raw.layout"],
            3
        );

        emitter.create_zgroup_files().unwrap();
        emitter.create_zattr_file().unwrap();
        let image = storage.group_attributes(IMAGE_GROUP).unwrap();
        assert_eq!(image["multiscales"][0]["datasets"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            storage.group_attributes(OME_GROUP).unwrap()["series"],
            json!(["0"])
        );
    }
}

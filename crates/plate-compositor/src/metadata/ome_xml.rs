//! OME-XML document describing the full-resolution plate image.

use serde::Serialize;

use crate::composition::PyramidParameters;
use crate::error::{CompositorError, Result};

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06 \
                               http://www.openmicroscopy.org/Schemas/OME/2016-06/ome.xsd";

#[derive(Debug, Serialize)]
#[serde(rename = "OME")]
pub struct OmeDocument {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "@xmlns:xsi")]
    xmlns_xsi: &'static str,
    #[serde(rename = "@xsi:schemaLocation")]
    schema_location: &'static str,
    #[serde(rename = "Image")]
    pub image: OmeImage,
}

#[derive(Debug, Serialize)]
pub struct OmeImage {
    #[serde(rename = "@ID")]
    pub id: String,
    #[serde(rename = "@Name")]
    pub name: String,
    #[serde(rename = "Pixels")]
    pub pixels: OmePixels,
}

#[derive(Debug, Serialize)]
pub struct OmePixels {
    #[serde(rename = "@ID")]
    pub id: String,
    #[serde(rename = "@DimensionOrder")]
    pub dimension_order: &'static str,
    #[serde(rename = "@Type")]
    pub pixel_type: &'static str,
    #[serde(rename = "@BigEndian")]
    pub big_endian: bool,
    #[serde(rename = "@SizeX")]
    pub size_x: u64,
    #[serde(rename = "@SizeY")]
    pub size_y: u64,
    #[serde(rename = "@SizeZ")]
    pub size_z: u64,
    #[serde(rename = "@SizeC")]
    pub size_c: u64,
    #[serde(rename = "@SizeT")]
    pub size_t: u64,
    #[serde(rename = "Channel")]
    pub channels: Vec<OmeChannel>,
}

#[derive(Debug, Serialize)]
pub struct OmeChannel {
    #[serde(rename = "@ID")]
    pub id: String,
    #[serde(rename = "@SamplesPerPixel")]
    pub samples_per_pixel: u32,
}

impl OmeDocument {
    /// Describe level 0 of the plate pyramid.
    pub fn for_plate(params: &PyramidParameters, image_name: &str) -> Result<Self> {
        let base = params.level(0)?;
        let channels = (0..params.channels)
            .map(|c| OmeChannel {
                id: format!("Channel:0:{}", c),
                samples_per_pixel: 1,
            })
            .collect();

        Ok(Self {
            xmlns: OME_NAMESPACE,
            xmlns_xsi: XSI_NAMESPACE,
            schema_location: SCHEMA_LOCATION,
            image: OmeImage {
                id: "Image:0".to_string(),
                name: image_name.to_string(),
                pixels: OmePixels {
                    id: "Pixels:0".to_string(),
                    dimension_order: "XYZCT",
                    pixel_type: params.element_type.ome_pixel_type(),
                    big_endian: cfg!(target_endian = "big"),
                    size_x: base.plate_shape.1,
                    size_y: base.plate_shape.0,
                    size_z: 1,
                    size_c: params.channels,
                    size_t: 1,
                    channels,
                },
            },
        })
    }

    /// Serialize with an XML declaration.
    pub fn to_xml(&self) -> Result<String> {
        let body = quick_xml::se::to_string(self)
            .map_err(|e| CompositorError::storage_error(format!("failed to serialize OME-XML: {}", e)))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axes::AxisLayout;
    use crate::composition::LevelGeometry;
    use crate::types::ElementType;
    use quick_xml::events::Event;
    use quick_xml::Reader;

    fn params() -> PyramidParameters {
        PyramidParameters {
            levels: vec![LevelGeometry {
                level: 0,
                grid: (2, 3),
                tile_shape: (100, 50),
                plate_shape: (200, 150),
            }],
            channels: 3,
            layout: AxisLayout::TCZYX,
            element_type: ElementType::Float32,
            chunk_size: 64,
        }
    }

    fn attribute(e: &quick_xml::events::BytesStart, name: &str) -> Option<String> {
        e.attributes()
            .flatten()
            .find(|a| a.key.as_ref() == name.as_bytes())
            .map(|a| String::from_utf8_lossy(&a.value).into_owned())
    }

    #[test]
    fn test_plate_document() {
        let xml = OmeDocument::for_plate(&params(), "plate_a")
            .unwrap()
            .to_xml()
            .unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\""));

        let mut reader = Reader::from_str(&xml);
        let mut channels = 0;
        let mut pixels_seen = false;
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                    b"Image" => assert_eq!(attribute(&e, "Name").as_deref(), Some("plate_a")),
                    b"Pixels" => {
                        pixels_seen = true;
                        assert_eq!(attribute(&e, "SizeX").as_deref(), Some("150"));
                        assert_eq!(attribute(&e, "SizeY").as_deref(), Some("200"));
                        assert_eq!(attribute(&e, "SizeC").as_deref(), Some("3"));
                        assert_eq!(attribute(&e, "Type").as_deref(), Some("float"));
                        assert_eq!(attribute(&e, "DimensionOrder").as_deref(), Some("XYZCT"));
                    }
                    b"Channel" => channels += 1,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => panic!("invalid XML: {}", e),
                _ => {}
            }
        }
        assert!(pixels_seen);
        assert_eq!(channels, 3);
    }
}

//! Configuration for the plate compositor.

use serde::{Deserialize, Serialize};

use crate::axes::AxisLayout;
use crate::types::CHUNK_SIZE;

/// Configuration for a plate composition run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositorConfig {
    /// Edge length of output chunks (rows and columns, every level).
    pub chunk_size: u64,

    /// Compression codec for output arrays.
    pub compression: ZarrCompression,

    /// Compression level (1-9).
    pub compression_level: u8,

    /// Enable byte shuffle filter for better compression.
    pub shuffle: bool,

    /// Axes carried by the well arrays.
    pub axes: AxisLayout,

    /// Worker threads for level-wide writes (0 = rayon default pool).
    pub worker_threads: usize,

    /// Image name recorded in the sidecar metadata.
    pub image_name: String,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            compression: ZarrCompression::BloscZstd,
            compression_level: 1,
            shuffle: true,
            axes: AxisLayout::TCZYX,
            worker_threads: 0,
            image_name: "plate".to_string(),
        }
    }
}

impl CompositorConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PLATE_CHUNK_SIZE") {
            if let Ok(size) = val.parse() {
                config.chunk_size = size;
            }
        }

        if let Ok(val) = std::env::var("PLATE_COMPRESSION") {
            config.compression = ZarrCompression::from_str(&val);
        }

        if let Ok(val) = std::env::var("PLATE_COMPRESSION_LEVEL") {
            if let Ok(level) = val.parse() {
                config.compression_level = level;
            }
        }

        if let Ok(val) = std::env::var("PLATE_SHUFFLE") {
            config.shuffle = val.to_lowercase() == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("PLATE_AXES") {
            match AxisLayout::parse(&val) {
                Ok(axes) => config.axes = axes,
                Err(e) => tracing::warn!(value = %val, error = %e, "Ignoring PLATE_AXES"),
            }
        }

        if let Ok(val) = std::env::var("PLATE_WORKER_THREADS") {
            if let Ok(threads) = val.parse() {
                config.worker_threads = threads;
            }
        }

        if let Ok(val) = std::env::var("PLATE_IMAGE_NAME") {
            config.image_name = val;
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be > 0".to_string());
        }

        if self.compression != ZarrCompression::None
            && (self.compression_level == 0 || self.compression_level > 9)
        {
            return Err("compression_level must be 1-9".to_string());
        }

        if self.image_name.is_empty() {
            return Err("image_name must not be empty".to_string());
        }

        Ok(())
    }
}

/// Compression codec for output arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZarrCompression {
    /// No compression.
    None,
    /// Blosc with LZ4.
    BloscLz4,
    /// Blosc with Zstd (recommended).
    #[default]
    BloscZstd,
}

impl ZarrCompression {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "none" => Self::None,
            "lz4" | "blosc_lz4" => Self::BloscLz4,
            "zstd" | "blosc_zstd" => Self::BloscZstd,
            _ => Self::BloscZstd,
        }
    }

    /// Get the codec name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::BloscLz4 => "blosc_lz4",
            Self::BloscZstd => "blosc_zstd",
        }
    }
}

impl std::fmt::Display for ZarrCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompositorConfig::default();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.compression, ZarrCompression::BloscZstd);
        assert_eq!(config.compression_level, 1);
        assert!(config.shuffle);
        assert_eq!(config.axes, AxisLayout::TCZYX);
        assert_eq!(config.worker_threads, 0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CompositorConfig::default();
        assert!(config.validate().is_ok());

        config.chunk_size = 0;
        assert!(config.validate().is_err());

        config = CompositorConfig::default();
        config.compression_level = 0;
        assert!(config.validate().is_err());

        config.compression_level = 10;
        assert!(config.validate().is_err());

        config.compression = ZarrCompression::None;
        assert!(config.validate().is_ok());

        config = CompositorConfig::default();
        config.image_name.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zarr_compression_from_str() {
        assert_eq!(ZarrCompression::from_str("none"), ZarrCompression::None);
        assert_eq!(ZarrCompression::from_str("lz4"), ZarrCompression::BloscLz4);
        assert_eq!(
            ZarrCompression::from_str("BLOSC_ZSTD"),
            ZarrCompression::BloscZstd
        );
        assert_eq!(
            ZarrCompression::from_str("invalid"),
            ZarrCompression::BloscZstd
        );
    }

    #[test]
    fn test_config_serde() {
        let config = CompositorConfig {
            compression: ZarrCompression::BloscLz4,
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["compression"], "blosc_lz4");
        let restored: CompositorConfig = serde_json::from_value(json).unwrap();
        assert_eq!(restored.compression, ZarrCompression::BloscLz4);
        assert_eq!(restored.axes, config.axes);
    }
}

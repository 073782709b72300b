//! Plate Pyramid Compositor
//!
//! This crate assembles one large multi-resolution plate image out of many
//! independently stored per-well pyramids. Each well may have its own pixel
//! dimensions; the plate is laid out on a fixed grid and written as square
//! chunks through a Zarr V3 storage engine.
//!
//! - **Chunk-addressed writes**: any output chunk can be produced on its own
//! - **Load-once caching**: each well is read at most once per run
//! - **Idempotent**: re-writing a finished chunk does no I/O
//!
//! # Architecture
//!
//! ```text
//! PlateCompositor::write_chunk(level, channel, y, x)
//!      │
//!      ├─► CompletionTracker: already written? ──► AlreadyWritten
//!      │
//!      ├─► Composition map: grid cells overlapping the chunk
//!      │         │
//!      │         ├─► Empty cell: leave zeros
//!      │         │
//!      │         └─► Well cell: WellCache ─► RegionReader ─► ArrayStorage
//!      │
//!      ├─► Copy overlapping rows into the chunk buffer
//!      │
//!      └─► ArrayStorage::write_region, mark complete
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use plate_compositor::{CompositorConfig, PlateCompositor, PlateLayout, ZarrStorage};
//!
//! let config = CompositorConfig::from_env();
//! let storage = Arc::new(ZarrStorage::filesystem("/data/plate", &config)?);
//!
//! let mut layout = PlateLayout::new();
//! layout.insert(0, 0, "wells/A01");
//! layout.insert(0, 1, "wells/A02");
//!
//! let mut compositor = PlateCompositor::with_storage(storage.clone(), config)?;
//! compositor.set_composition(&layout.composition(storage.as_ref())?)?;
//! compositor.write_pyramid()?;
//! compositor.create_auxiliary_files()?;
//! ```

pub mod axes;
pub mod cache;
pub mod composition;
pub mod compositor;
pub mod config;
pub mod error;
pub mod layout;
pub mod metadata;
pub mod range;
pub mod reader;
pub mod storage;
pub mod types;

// Re-export commonly used types at crate root
pub use axes::{AxisLayout, AxisShape};
pub use cache::{CompletionTracker, WellBuffer, WellCache};
pub use composition::{
    Cell, CompositionMap, GridCell, LevelGeometry, PyramidParameters, ResolvedComposition,
    WellDescriptor,
};
pub use compositor::PlateCompositor;
pub use config::{CompositorConfig, ZarrCompression};
pub use error::{CompositorError, ErrorKind, Result};
pub use layout::{well_array_location, PlateLayout};
pub use metadata::{output_location, MetadataEmitter};
pub use range::Range;
pub use reader::RegionReader;
pub use storage::{ArrayHandle, ArraySpec, ArrayStorage, ZarrStorage};
pub use types::{
    CacheStats, ChunkCoord, ElementType, ImageData, PixelElement, WellId, WriteOutcome,
    WriteSummary, CHUNK_SIZE,
};

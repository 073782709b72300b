//! Load-once cache of whole well buffers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::composition::WellDescriptor;
use crate::error::Result;
use crate::reader::RegionReader;
use crate::types::{CacheStats, ImageData, WellId};

use super::lock;

/// A well's full pixel data, read-only once loaded.
#[derive(Debug)]
pub struct WellBuffer {
    pub well: WellId,
    pub data: ImageData,
    /// Shape in storage axis order.
    pub shape: Vec<u64>,
}

type Slot = Arc<Mutex<Option<Arc<WellBuffer>>>>;

/// Cache of well buffers keyed by [`WellId`].
///
/// Each well has its own slot; concurrent first touches of one well queue
/// on that slot so the well is read once, while loads of different wells
/// proceed in parallel.
pub struct WellCache {
    reader: Arc<RegionReader>,
    slots: Mutex<HashMap<WellId, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    memory_bytes: AtomicU64,
}

impl WellCache {
    pub fn new(reader: Arc<RegionReader>) -> Self {
        Self {
            reader,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            memory_bytes: AtomicU64::new(0),
        }
    }

    /// Return the cached buffer for `well`, loading its full extent on first use.
    ///
    /// A failed load leaves the slot empty; the next caller retries.
    pub fn get_or_load(&self, well: &WellDescriptor) -> Result<Arc<WellBuffer>> {
        let slot = lock(&self.slots).entry(well.id).or_default().clone();

        let mut entry = lock(&slot);
        if let Some(buffer) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(buffer.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let (data, shape) = self
            .reader
            .read_full(well)
            .map_err(|e| e.for_well(well.id, well.location()))?;

        debug!(
            well = %well.id,
            location = well.location(),
            elements = data.len(),
            "Loaded well buffer"
        );

        self.memory_bytes
            .fetch_add(data.size_bytes() as u64, Ordering::Relaxed);
        let buffer = Arc::new(WellBuffer {
            well: well.id,
            data,
            shape,
        });
        *entry = Some(buffer.clone());
        Ok(buffer)
    }

    /// The buffer for `id` if it is already loaded.
    pub fn get(&self, id: WellId) -> Option<Arc<WellBuffer>> {
        let slot = lock(&self.slots).get(&id).cloned()?;
        let entry = lock(&slot);
        entry.clone()
    }

    /// Number of loaded wells.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = lock(&self.slots).values().cloned().collect();
        slots.iter().filter(|slot| lock(slot).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every buffer and reset statistics.
    pub fn clear(&mut self) {
        self.slots
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        *self.hits.get_mut() = 0;
        *self.misses.get_mut() = 0;
        *self.memory_bytes.get_mut() = 0;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
            memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
        }
    }
}

//! Common test utilities for plate-compositor tests
//!
//! Provides helpers for:
//! - Opening filesystem-backed storage in a temp directory
//! - Counting storage operations per location
//! - Reading back a composited plate plane

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plate_compositor::{
    ArrayHandle, ArraySpec, ArrayStorage, CompositorConfig, ImageData, Range, Result,
    ZarrCompression, ZarrStorage,
};
use serde_json::{Map, Value};
use zarrs_filesystem::FilesystemStore;

/// Uncompressed config with a small chunk edge.
pub fn test_config(chunk_size: u64) -> CompositorConfig {
    CompositorConfig {
        chunk_size,
        compression: ZarrCompression::None,
        ..Default::default()
    }
}

/// Filesystem storage rooted at `dir`.
pub fn zarr_storage(dir: &Path, config: &CompositorConfig) -> Arc<ZarrStorage<FilesystemStore>> {
    Arc::new(ZarrStorage::filesystem(dir, config).expect("Failed to create storage"))
}

/// Storage wrapper recording every call made through it.
pub struct CountingStorage {
    inner: Arc<dyn ArrayStorage>,
    opens: AtomicUsize,
    reads: Mutex<HashMap<String, usize>>,
    writes: AtomicUsize,
    read_delay: Option<Duration>,
}

impl CountingStorage {
    pub fn new(inner: Arc<dyn ArrayStorage>) -> Self {
        Self {
            inner,
            opens: AtomicUsize::new(0),
            reads: Mutex::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            read_delay: None,
        }
    }

    /// Sleep inside every read, widening race windows.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Region reads of `location`.
    pub fn reads_of(&self, location: &str) -> usize {
        self.reads
            .lock()
            .unwrap()
            .get(location)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.reads.lock().unwrap().values().sum()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ArrayStorage for CountingStorage {
    fn open(&self, location: &str) -> Result<ArrayHandle> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.inner.open(location)
    }

    fn create(&self, location: &str, spec: &ArraySpec) -> Result<ArrayHandle> {
        self.inner.create(location, spec)
    }

    fn read_region(&self, handle: &ArrayHandle, ranges: &[Range]) -> Result<ImageData> {
        *self
            .reads
            .lock()
            .unwrap()
            .entry(handle.location().to_string())
            .or_default() += 1;
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }
        self.inner.read_region(handle, ranges)
    }

    fn write_region(&self, handle: &ArrayHandle, ranges: &[Range], data: &ImageData) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_region(handle, ranges, data)
    }

    fn group_attributes(&self, location: &str) -> Result<Map<String, Value>> {
        self.inner.group_attributes(location)
    }

    fn create_group(&self, location: &str, attributes: Map<String, Value>) -> Result<()> {
        self.inner.create_group(location, attributes)
    }

    fn put_object(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.inner.put_object(key, value)
    }
}

/// Read one channel of an output level as `u32` pixels.
pub fn read_plane(storage: &dyn ArrayStorage, level: usize, channel: u64) -> Vec<u32> {
    let handle = storage
        .open(&plate_compositor::output_location(level))
        .expect("Failed to open output");
    let shape = handle.shape().to_vec();
    let ranges = [
        Range::single(0),
        Range::single(channel),
        Range::single(0),
        Range::span(0, shape[3]),
        Range::span(0, shape[4]),
    ];
    let data = storage
        .read_region(&handle, &ranges)
        .expect("Failed to read output");
    data.as_slice::<u32>().expect("uint32 output").to_vec()
}

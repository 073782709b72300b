//! Plate compositor: assembles output chunks from well pyramids.

use std::sync::Arc;

use rayon::prelude::*;
use serde_json::Map;
use tracing::{debug, info};

use crate::cache::{CompletionTracker, WellCache};
use crate::composition::{CompositionMap, LevelGeometry, PyramidParameters, ResolvedComposition, WellDescriptor};
use crate::config::CompositorConfig;
use crate::error::{CompositorError, Result};
use crate::metadata::{output_location, MetadataEmitter};
use crate::range::Range;
use crate::reader::RegionReader;
use crate::storage::{ArrayHandle, ArraySpec, ArrayStorage};
use crate::types::{CacheStats, ChunkCoord, CopyRun, ImageData, WriteOutcome, WriteSummary};

/// State owned by one installed composition.
struct RunContext {
    composition: ResolvedComposition,
    params: PyramidParameters,
    cache: WellCache,
    completed: CompletionTracker,
    /// Output array per level.
    outputs: Vec<ArrayHandle>,
}

impl RunContext {
    fn has_progress(&self) -> bool {
        !self.cache.is_empty() || !self.completed.is_empty()
    }
}

/// Composes per-well pyramids into one chunked plate pyramid.
///
/// Wells are read from `source`; the plate pyramid and its sidecar metadata
/// are written to `sink`. Both may be the same storage.
///
/// `write_chunk` may be called from many threads at once. Installing or
/// resetting a composition takes `&mut self`, so it can never overlap a
/// write.
pub struct PlateCompositor {
    source: Arc<dyn ArrayStorage>,
    sink: Arc<dyn ArrayStorage>,
    config: CompositorConfig,
    pool: Option<rayon::ThreadPool>,
    run: Option<RunContext>,
}

impl PlateCompositor {
    /// Create a compositor.
    ///
    /// # Arguments
    /// * `source` - Storage holding the well pyramids
    /// * `sink` - Storage receiving the plate pyramid
    /// * `config` - Compositor configuration
    pub fn new(
        source: Arc<dyn ArrayStorage>,
        sink: Arc<dyn ArrayStorage>,
        config: CompositorConfig,
    ) -> Result<Self> {
        config.validate().map_err(CompositorError::config)?;

        let pool = if config.worker_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.worker_threads)
                .thread_name(|i| format!("plate-writer-{}", i))
                .build()
                .map_err(|e| CompositorError::config(format!("failed to build thread pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            source,
            sink,
            config,
            pool,
            run: None,
        })
    }

    /// Create a compositor reading and writing the same storage.
    pub fn with_storage(storage: Arc<dyn ArrayStorage>, config: CompositorConfig) -> Result<Self> {
        Self::new(storage.clone(), storage, config)
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Install a composition map.
    ///
    /// Opens every referenced well, derives the pyramid parameters and
    /// creates one output array per level. Replaces a previously installed
    /// map only if nothing has been loaded or written since the last reset.
    pub fn set_composition(&mut self, map: &CompositionMap) -> Result<()> {
        if self.run.as_ref().is_some_and(RunContext::has_progress) {
            return Err(CompositorError::invalid_state(
                "composition has cached wells or written chunks; call reset_composition first",
            ));
        }

        let (composition, params) = ResolvedComposition::build(
            map,
            self.source.as_ref(),
            self.config.axes,
            self.config.chunk_size,
        )?;

        let reader = Arc::new(RegionReader::new(
            self.source.clone(),
            params.element_type_code(),
            params.layout,
        )?);

        let mut outputs = Vec::with_capacity(params.num_levels());
        for level in 0..params.num_levels() {
            let spec = ArraySpec {
                shape: params.output_shape(level)?,
                chunk_shape: params.output_chunk_shape(),
                element_type: params.element_type,
                attributes: Map::new(),
            };
            let location = output_location(level);
            debug!(level, location = %location, shape = ?spec.shape, "Creating output array");
            outputs.push(self.sink.create(&location, &spec)?);
        }

        self.run = Some(RunContext {
            composition,
            params,
            cache: WellCache::new(reader),
            completed: CompletionTracker::new(),
            outputs,
        });
        Ok(())
    }

    /// Drop cached wells and forget written chunks, keeping the installed
    /// composition.
    pub fn reset_composition(&mut self) {
        if let Some(run) = self.run.as_mut() {
            run.cache.clear();
            run.completed.clear();
            info!("Reset composition run state");
        }
    }

    fn run(&self) -> Result<&RunContext> {
        self.run
            .as_ref()
            .ok_or_else(|| CompositorError::invalid_state("no composition installed"))
    }

    /// Pyramid parameters of the installed composition.
    pub fn parameters(&self) -> Result<&PyramidParameters> {
        Ok(&self.run()?.params)
    }

    /// The well supplying a grid cell, `None` for an empty cell.
    pub fn resolve(&self, level: usize, row: u64, col: u64) -> Result<Option<&WellDescriptor>> {
        self.run()?.composition.resolve(level, row, col)
    }

    /// Number of output chunks `(y, x)` at `level`.
    pub fn chunk_grid(&self, level: usize) -> Result<(u64, u64)> {
        let params = &self.run()?.params;
        Ok(params.level(level)?.chunk_grid(params.chunk_size))
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.run()?.cache.stats())
    }

    /// Chunks written since the composition was installed or last reset.
    pub fn completed_chunks(&self) -> Result<Vec<ChunkCoord>> {
        Ok(self.run()?.completed.completed())
    }

    /// Output array handle for `level`.
    pub fn output(&self, level: usize) -> Result<&ArrayHandle> {
        let run = self.run()?;
        run.outputs.get(level).ok_or_else(|| {
            CompositorError::out_of_bounds(
                format!("level {}", level),
                format!("{} levels", run.outputs.len()),
            )
        })
    }

    /// Assemble and write one output chunk.
    ///
    /// # Arguments
    /// * `level` - Pyramid level
    /// * `channel` - Output channel
    /// * `y_index` - Chunk row index
    /// * `x_index` - Chunk column index
    ///
    /// # Returns
    /// `WriteOutcome::AlreadyWritten` without any I/O if the chunk was
    /// written earlier in this run.
    pub fn write_chunk(
        &self,
        level: usize,
        channel: u64,
        y_index: u64,
        x_index: u64,
    ) -> Result<WriteOutcome> {
        let run = self.run()?;
        let params = &run.params;
        let geometry = params.level(level)?;

        if channel >= params.channels {
            return Err(CompositorError::out_of_bounds(
                format!("channel {}", channel),
                format!("{} channels", params.channels),
            ));
        }
        let (chunks_y, chunks_x) = geometry.chunk_grid(params.chunk_size);
        if y_index >= chunks_y || x_index >= chunks_x {
            return Err(CompositorError::out_of_bounds(
                format!("chunk ({}, {})", y_index, x_index),
                format!("{}x{} chunks at level {}", chunks_y, chunks_x, level),
            ));
        }

        let coord = ChunkCoord::new(level, channel, y_index, x_index);
        let claim = run.completed.claim(coord);
        let _guard = claim.lock();

        if run.completed.is_complete(&coord) {
            debug!(%coord, "Chunk already written");
            return Ok(WriteOutcome::AlreadyWritten);
        }

        let size = params.chunk_size;
        let rows = Range::span(y_index * size, ((y_index + 1) * size).min(geometry.plate_shape.0));
        let cols = Range::span(x_index * size, ((x_index + 1) * size).min(geometry.plate_shape.1));

        let buffer = assemble(run, geometry, channel, rows, cols).map_err(|e| e.in_chunk(coord))?;

        let ranges = [
            Range::single(0),
            Range::single(channel),
            Range::single(0),
            rows,
            cols,
        ];
        self.sink
            .write_region(&run.outputs[level], &ranges, &buffer)
            .map_err(|e| e.in_chunk(coord))?;

        run.completed.mark_complete(coord);
        debug!(%coord, elements = buffer.len(), "Wrote chunk");
        Ok(WriteOutcome::Written)
    }

    /// Write every chunk of `level` across all channels, in parallel.
    pub fn write_level(&self, level: usize) -> Result<WriteSummary> {
        let params = &self.run()?.params;
        let (chunks_y, chunks_x) = params.level(level)?.chunk_grid(params.chunk_size);

        let coords: Vec<(u64, u64, u64)> = (0..params.channels)
            .flat_map(|c| (0..chunks_y).flat_map(move |y| (0..chunks_x).map(move |x| (c, y, x))))
            .collect();

        let outcomes = self.install(|| {
            coords
                .par_iter()
                .map(|&(channel, y, x)| self.write_chunk(level, channel, y, x))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut summary = WriteSummary::default();
        for outcome in outcomes {
            summary.record(outcome);
        }

        info!(
            level,
            written = summary.written,
            skipped = summary.skipped,
            "Wrote pyramid level"
        );
        Ok(summary)
    }

    /// Write every chunk of every level.
    pub fn write_pyramid(&self) -> Result<WriteSummary> {
        let levels = self.run()?.params.num_levels();
        let mut summary = WriteSummary::default();
        for level in 0..levels {
            let level_summary = self.write_level(level)?;
            summary.written += level_summary.written;
            summary.skipped += level_summary.skipped;
        }
        Ok(summary)
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn emitter(&self) -> Result<MetadataEmitter<'_>> {
        Ok(MetadataEmitter::new(
            self.sink.as_ref(),
            &self.run()?.params,
            &self.config.image_name,
        ))
    }

    /// Write group declarations, multiscales attributes and OME-XML.
    pub fn create_auxiliary_files(&self) -> Result<()> {
        self.emitter()?.emit()
    }

    pub fn create_zgroup_files(&self) -> Result<()> {
        self.emitter()?.create_zgroup_files()
    }

    pub fn create_zattr_file(&self) -> Result<()> {
        self.emitter()?.create_zattr_file()
    }

    pub fn create_xml(&self) -> Result<()> {
        self.emitter()?.create_xml()
    }
}

/// Build the `rows` x `cols` buffer of one channel from every overlapping
/// grid cell.
fn assemble(
    run: &RunContext,
    geometry: &LevelGeometry,
    channel: u64,
    rows: Range,
    cols: Range,
) -> Result<ImageData> {
    let params = &run.params;
    let (tile_rows, tile_cols) = geometry.tile_shape;
    let (y0, y1) = (rows.start() as u64, rows.stop() as u64);
    let (x0, x1) = (cols.start() as u64, cols.stop() as u64);
    let width = x1 - x0;

    let mut buffer = ImageData::zeros(params.element_type, (rows.len() * cols.len()) as usize);
    if buffer.is_empty() {
        return Ok(buffer);
    }

    for row_tile in y0 / tile_rows..=(y1 - 1) / tile_rows {
        for col_tile in x0 / tile_cols..=(x1 - 1) / tile_cols {
            let Some(well) = run.composition.resolve(geometry.level, row_tile, col_tile)? else {
                continue;
            };
            if channel >= well.shape.channels {
                return Err(CompositorError::out_of_bounds(
                    format!("channel {}", channel),
                    format!("{} channels", well.shape.channels),
                )
                .for_well(well.id, well.location()));
            }

            // Overlap in plate coordinates, clipped to the well's own extent.
            let cell_y = row_tile * tile_rows;
            let cell_x = col_tile * tile_cols;
            let (oy0, oy1) = (y0.max(cell_y), y1.min(cell_y + well.shape.rows));
            let (ox0, ox1) = (x0.max(cell_x), x1.min(cell_x + well.shape.cols));
            if oy0 >= oy1 || ox0 >= ox1 {
                continue;
            }

            let source = run.cache.get_or_load(well)?;
            let runs: Vec<CopyRun> = (oy0..oy1)
                .map(|y| CopyRun {
                    src: params
                        .layout
                        .offset(&source.shape, 0, channel, 0, y - cell_y, ox0 - cell_x),
                    dst: ((y - y0) * width + (ox0 - x0)) as usize,
                    len: (ox1 - ox0) as usize,
                })
                .collect();
            buffer.copy_runs_from(&source.data, &runs)?;
        }
    }

    Ok(buffer)
}

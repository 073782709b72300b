//! Composition map: which well supplies each output grid cell.
//!
//! A [`CompositionMap`] is the caller's input, keyed by
//! `(level, row_tile, col_tile)`. Installing it resolves every referenced
//! well into a [`WellDescriptor`] and derives the [`PyramidParameters`] of
//! the output plate.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::info;

use crate::axes::{AxisLayout, AxisShape};
use crate::error::{CompositorError, Result};
use crate::storage::{ArrayHandle, ArrayStorage};
use crate::types::{ElementType, WellId};

/// Key of one output grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub level: usize,
    pub row: u64,
    pub col: u64,
}

/// Content of one grid cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// Filled from the well array at this location.
    Well(String),
    /// Deliberately unoccupied; rendered as zeros.
    Empty,
}

/// Mapping from output grid cells to well array locations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositionMap {
    cells: BTreeMap<GridCell, Cell>,
}

impl CompositionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a grid cell to the well array at `location`.
    pub fn insert(&mut self, level: usize, row: u64, col: u64, location: impl Into<String>) {
        self.cells
            .insert(GridCell { level, row, col }, Cell::Well(location.into()));
    }

    /// Mark a grid cell as deliberately empty.
    pub fn insert_empty(&mut self, level: usize, row: u64, col: u64) {
        self.cells.insert(GridCell { level, row, col }, Cell::Empty);
    }

    pub fn get(&self, level: usize, row: u64, col: u64) -> Option<&Cell> {
        self.cells.get(&GridCell { level, row, col })
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GridCell, &Cell)> {
        self.cells.iter()
    }

    /// Distinct levels present in the map.
    pub fn levels(&self) -> BTreeSet<usize> {
        self.cells.keys().map(|k| k.level).collect()
    }

    /// Distinct well locations, sorted.
    pub fn locations(&self) -> BTreeSet<&str> {
        self.cells
            .values()
            .filter_map(|c| match c {
                Cell::Well(location) => Some(location.as_str()),
                Cell::Empty => None,
            })
            .collect()
    }

    /// Grid extent `(rows, cols)` spanned by the keys at `level`.
    pub fn grid_extent(&self, level: usize) -> (u64, u64) {
        self.cells
            .keys()
            .filter(|k| k.level == level)
            .fold((0, 0), |(rows, cols), k| {
                (rows.max(k.row + 1), cols.max(k.col + 1))
            })
    }
}

impl FromIterator<((usize, u64, u64), String)> for CompositionMap {
    fn from_iter<I: IntoIterator<Item = ((usize, u64, u64), String)>>(iter: I) -> Self {
        let mut map = Self::new();
        for ((level, row, col), location) in iter {
            map.insert(level, row, col, location);
        }
        map
    }
}

impl From<HashMap<(usize, u64, u64), String>> for CompositionMap {
    fn from(cells: HashMap<(usize, u64, u64), String>) -> Self {
        cells.into_iter().collect()
    }
}

/// One source well array, resolved at install time.
#[derive(Debug, Clone)]
pub struct WellDescriptor {
    pub id: WellId,
    pub level: usize,
    pub handle: ArrayHandle,
    pub shape: AxisShape,
    /// Grid cell size `(tile_rows, tile_cols)` at this well's level.
    pub tile_shape: (u64, u64),
}

impl WellDescriptor {
    pub fn location(&self) -> &str {
        self.handle.location()
    }
}

/// Output geometry of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelGeometry {
    pub level: usize,
    /// Grid cells `(rows, cols)`.
    pub grid: (u64, u64),
    /// Cell size `(rows, cols)` in pixels.
    pub tile_shape: (u64, u64),
    /// Plate size `(rows, cols)` in pixels.
    pub plate_shape: (u64, u64),
}

impl LevelGeometry {
    /// Number of output chunks `(y, x)` for a chunk edge length.
    pub fn chunk_grid(&self, chunk_size: u64) -> (u64, u64) {
        (
            self.plate_shape.0.div_ceil(chunk_size),
            self.plate_shape.1.div_ceil(chunk_size),
        )
    }
}

/// Global parameters of the output pyramid, fixed for a run.
#[derive(Debug, Clone)]
pub struct PyramidParameters {
    pub levels: Vec<LevelGeometry>,
    pub channels: u64,
    pub layout: AxisLayout,
    pub element_type: ElementType,
    pub chunk_size: u64,
}

impl PyramidParameters {
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn element_type_code(&self) -> u16 {
        self.element_type.code()
    }

    pub fn level(&self, level: usize) -> Result<&LevelGeometry> {
        self.levels.get(level).ok_or_else(|| {
            CompositorError::out_of_bounds(
                format!("level {}", level),
                format!("{} levels", self.levels.len()),
            )
        })
    }

    /// Output array shape `[t, c, z, y, x]` at `level`.
    pub fn output_shape(&self, level: usize) -> Result<Vec<u64>> {
        let geometry = self.level(level)?;
        Ok(vec![
            1,
            self.channels,
            1,
            geometry.plate_shape.0,
            geometry.plate_shape.1,
        ])
    }

    /// Output chunk shape `[t, c, z, y, x]`.
    pub fn output_chunk_shape(&self) -> Vec<u64> {
        vec![1, 1, 1, self.chunk_size, self.chunk_size]
    }
}

/// Installed composition: grid cells resolved to well descriptors.
#[derive(Debug, Clone)]
pub struct ResolvedComposition {
    cells: HashMap<GridCell, Option<WellId>>,
    wells: Vec<WellDescriptor>,
}

impl ResolvedComposition {
    /// Open every referenced well, check element types and derive the
    /// pyramid parameters.
    pub fn build(
        map: &CompositionMap,
        storage: &dyn ArrayStorage,
        layout: AxisLayout,
        chunk_size: u64,
    ) -> Result<(Self, PyramidParameters)> {
        if map.is_empty() {
            return Err(CompositorError::config("composition map is empty"));
        }

        let levels = map.levels();
        for (expected, &level) in levels.iter().enumerate() {
            if expected != level {
                return Err(CompositorError::config(format!(
                    "composition map skips level {}",
                    expected
                )));
            }
        }

        let mut well_levels: HashMap<&str, usize> = HashMap::new();
        for (key, cell) in map.iter() {
            if let Cell::Well(location) = cell {
                if let Some(&other) = well_levels.get(location.as_str()) {
                    if other != key.level {
                        return Err(CompositorError::config(format!(
                            "well array {} is mapped at levels {} and {}",
                            location, other, key.level
                        )));
                    }
                }
                well_levels.insert(location.as_str(), key.level);
            }
        }

        let mut element_type: Option<ElementType> = None;
        let mut opened: Vec<(WellId, usize, ArrayHandle, AxisShape)> = Vec::new();
        let mut ids: HashMap<&str, WellId> = HashMap::new();
        for (index, location) in map.locations().into_iter().enumerate() {
            let id = WellId(index as u32);
            let handle = storage
                .open(location)
                .map_err(|e| e.for_well(id, location))?;
            match element_type {
                None => element_type = Some(handle.element_type()),
                Some(expected) if expected != handle.element_type() => {
                    return Err(CompositorError::ElementTypeMismatch {
                        expected: expected.to_string(),
                        found: handle.element_type().to_string(),
                    }
                    .for_well(id, location));
                }
                Some(_) => {}
            }
            let shape = layout
                .shape_from(handle.shape())
                .map_err(|e| e.for_well(id, location))?;
            ids.insert(location, id);
            opened.push((id, well_levels[location], handle, shape));
        }

        let element_type = element_type
            .ok_or_else(|| CompositorError::config("composition map references no wells"))?;

        let mut geometries = Vec::with_capacity(levels.len());
        for &level in &levels {
            let tile_shape = opened
                .iter()
                .filter(|(_, l, _, _)| *l == level)
                .fold((0, 0), |(rows, cols), (_, _, _, shape)| {
                    (rows.max(shape.rows), cols.max(shape.cols))
                });
            if tile_shape.0 == 0 || tile_shape.1 == 0 {
                return Err(CompositorError::config(format!(
                    "level {} has no non-empty wells",
                    level
                )));
            }
            let grid = map.grid_extent(level);
            geometries.push(LevelGeometry {
                level,
                grid,
                tile_shape,
                plate_shape: (grid.0 * tile_shape.0, grid.1 * tile_shape.1),
            });
        }

        let channels = opened
            .iter()
            .map(|(_, _, _, shape)| shape.channels)
            .max()
            .unwrap_or(1);

        let wells: Vec<WellDescriptor> = opened
            .into_iter()
            .map(|(id, level, handle, shape)| WellDescriptor {
                id,
                level,
                handle,
                shape,
                tile_shape: geometries[level].tile_shape,
            })
            .collect();

        let cells = map
            .iter()
            .map(|(key, cell)| {
                let id = match cell {
                    Cell::Well(location) => ids.get(location.as_str()).copied(),
                    Cell::Empty => None,
                };
                (*key, id)
            })
            .collect();

        let params = PyramidParameters {
            levels: geometries,
            channels,
            layout,
            element_type,
            chunk_size,
        };

        info!(
            levels = params.num_levels(),
            wells = wells.len(),
            channels,
            element_type = %element_type,
            "Installed composition"
        );

        Ok((Self { cells, wells }, params))
    }

    /// The well supplying a grid cell, `None` for a deliberately empty cell.
    pub fn resolve(&self, level: usize, row: u64, col: u64) -> Result<Option<&WellDescriptor>> {
        match self.cells.get(&GridCell { level, row, col }) {
            None => Err(CompositorError::UnmappedCell { level, row, col }),
            Some(None) => Ok(None),
            Some(Some(id)) => Ok(self.wells.get(id.0 as usize)),
        }
    }

    pub fn wells(&self) -> &[WellDescriptor] {
        &self.wells
    }

    pub fn well(&self, id: WellId) -> Option<&WellDescriptor> {
        self.wells.get(id.0 as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_extent_and_locations() {
        let mut map = CompositionMap::new();
        map.insert(0, 0, 0, "a/0");
        map.insert(0, 1, 2, "b/0");
        map.insert_empty(0, 1, 0);
        map.insert(1, 0, 0, "a/1");

        assert_eq!(map.len(), 4);
        assert_eq!(map.grid_extent(0), (2, 3));
        assert_eq!(map.grid_extent(1), (1, 1));
        assert_eq!(map.grid_extent(5), (0, 0));
        assert_eq!(map.levels().into_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(
            map.locations().into_iter().collect::<Vec<_>>(),
            vec!["a/0", "a/1", "b/0"]
        );
        assert_eq!(map.get(0, 1, 0), Some(&Cell::Empty));
        assert_eq!(map.get(0, 0, 0), Some(&Cell::Well("a/0".to_string())));
        assert_eq!(map.get(0, 5, 5), None);
    }

    #[test]
    fn test_map_from_hashmap() {
        let mut cells = HashMap::new();
        cells.insert((0, 0, 0), "wellA".to_string());
        cells.insert((0, 0, 1), "wellB".to_string());
        let map = CompositionMap::from(cells);
        assert_eq!(map.len(), 2);
        assert_eq!(map.grid_extent(0), (1, 2));
    }

    #[test]
    fn test_level_chunk_grid() {
        let geometry = LevelGeometry {
            level: 0,
            grid: (2, 3),
            tile_shape: (100, 70),
            plate_shape: (200, 210),
        };
        assert_eq!(geometry.chunk_grid(64), (4, 4));
        assert_eq!(geometry.chunk_grid(1024), (1, 1));
        assert_eq!(geometry.chunk_grid(70), (3, 3));
    }
}

//! Plate layout: which well pyramid sits at each plate position.

use std::collections::BTreeMap;

use tracing::debug;

use crate::composition::CompositionMap;
use crate::error::{CompositorError, Result};
use crate::storage::ArrayStorage;

/// Location of a well pyramid's array for `level`, relative to the storage root.
pub fn well_array_location(root: &str, level: usize) -> String {
    let root = root.trim_matches('/');
    if root.is_empty() {
        format!("data.zarr/0/{}", level)
    } else {
        format!("{}/data.zarr/0/{}", root, level)
    }
}

fn well_image_group(root: &str) -> String {
    let root = root.trim_matches('/');
    if root.is_empty() {
        "data.zarr/0".to_string()
    } else {
        format!("{}/data.zarr/0", root)
    }
}

/// Plate positions `(row, col)` mapped to well pyramid roots.
///
/// Expands into a [`CompositionMap`] with one entry per position per level.
#[derive(Debug, Clone, Default)]
pub struct PlateLayout {
    positions: BTreeMap<(u64, u64), Option<String>>,
}

impl PlateLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the well pyramid rooted at `root` at `(row, col)`.
    pub fn insert(&mut self, row: u64, col: u64, root: impl Into<String>) {
        self.positions.insert((row, col), Some(root.into()));
    }

    /// Leave `(row, col)` unoccupied.
    pub fn insert_empty(&mut self, row: u64, col: u64) {
        self.positions.insert((row, col), None);
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Composition map covering `levels` pyramid levels.
    pub fn to_composition(&self, levels: usize) -> CompositionMap {
        let mut map = CompositionMap::new();
        for level in 0..levels {
            for (&(row, col), root) in &self.positions {
                match root {
                    Some(root) => map.insert(level, row, col, well_array_location(root, level)),
                    None => map.insert_empty(level, row, col),
                }
            }
        }
        map
    }

    /// Number of levels declared by the first well's `multiscales` attributes.
    pub fn discover_levels(&self, storage: &dyn ArrayStorage) -> Result<usize> {
        let root = self
            .positions
            .values()
            .flatten()
            .next()
            .ok_or_else(|| CompositorError::config("plate layout has no wells"))?;

        let group = well_image_group(root);
        let attrs = storage.group_attributes(&group)?;
        let levels = attrs
            .get("multiscales")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("datasets"))
            .and_then(|v| v.as_array())
            .map(Vec::len)
            .ok_or_else(|| {
                CompositorError::config(format!("{} has no multiscales datasets", group))
            })?;

        if levels == 0 {
            return Err(CompositorError::config(format!(
                "{} declares zero pyramid levels",
                group
            )));
        }

        debug!(group = %group, levels, "Discovered pyramid levels");
        Ok(levels)
    }

    /// Composition map covering every level the wells declare.
    pub fn composition(&self, storage: &dyn ArrayStorage) -> Result<CompositionMap> {
        Ok(self.to_composition(self.discover_levels(storage)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::Cell;

    #[test]
    fn test_well_array_location() {
        assert_eq!(well_array_location("A01", 2), "A01/data.zarr/0/2");
        assert_eq!(well_array_location("/plates/B02/", 0), "plates/B02/data.zarr/0/0");
        assert_eq!(well_array_location("", 1), "data.zarr/0/1");
    }

    #[test]
    fn test_to_composition() {
        let mut layout = PlateLayout::new();
        layout.insert(0, 0, "A01");
        layout.insert(0, 1, "A02");
        layout.insert_empty(1, 0);
        layout.insert(1, 1, "B02");

        let map = layout.to_composition(3);
        assert_eq!(map.len(), 12);
        assert_eq!(map.levels().len(), 3);
        assert_eq!(
            map.get(2, 0, 1),
            Some(&Cell::Well("A02/data.zarr/0/2".to_string()))
        );
        assert_eq!(map.get(1, 1, 0), Some(&Cell::Empty));
    }
}

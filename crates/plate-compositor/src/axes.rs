//! Axis layout of well arrays and their logical shapes.
//!
//! Storage axis order is always `[t?, c?, z?, y, x]`: the optional axes
//! appear only when the plate carries them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CompositorError, Result};
use crate::range::Range;

/// Which optional axes the source arrays carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisLayout {
    pub has_t: bool,
    pub has_c: bool,
    pub has_z: bool,
}

impl Default for AxisLayout {
    fn default() -> Self {
        Self::TCZYX
    }
}

impl AxisLayout {
    /// Full five-dimensional OME layout.
    pub const TCZYX: AxisLayout = AxisLayout {
        has_t: true,
        has_c: true,
        has_z: true,
    };

    /// Plain two-dimensional images.
    pub const YX: AxisLayout = AxisLayout {
        has_t: false,
        has_c: false,
        has_z: false,
    };

    /// Parse an axis string such as `tczyx`, `cyx` or `yx` (case-insensitive).
    ///
    /// The string must end in `yx` and list present optional axes in `t, c, z` order.
    pub fn parse(s: &str) -> Result<Self> {
        let lower = s.to_lowercase();
        let prefix = lower.strip_suffix("yx").ok_or_else(|| {
            CompositorError::config(format!("axis string '{}' must end with 'yx'", s))
        })?;

        let mut layout = Self::YX;
        let mut last = 0;
        for ch in prefix.chars() {
            let (order, flag) = match ch {
                't' => (1, &mut layout.has_t),
                'c' => (2, &mut layout.has_c),
                'z' => (3, &mut layout.has_z),
                _ => {
                    return Err(CompositorError::config(format!(
                        "unknown axis '{}' in '{}'",
                        ch, s
                    )))
                }
            };
            if order <= last || *flag {
                return Err(CompositorError::config(format!(
                    "axes in '{}' must be unique and ordered t, c, z, y, x",
                    s
                )));
            }
            *flag = true;
            last = order;
        }
        Ok(layout)
    }

    /// Number of storage dimensions.
    pub fn ndim(&self) -> usize {
        2 + self.has_t as usize + self.has_c as usize + self.has_z as usize
    }

    /// Axis names in storage order.
    pub fn axis_names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(self.ndim());
        if self.has_t {
            names.push("t");
        }
        if self.has_c {
            names.push("c");
        }
        if self.has_z {
            names.push("z");
        }
        names.push("y");
        names.push("x");
        names
    }

    /// Interpret a storage shape under this layout.
    pub fn shape_from(&self, storage_shape: &[u64]) -> Result<AxisShape> {
        if storage_shape.len() != self.ndim() {
            return Err(CompositorError::config(format!(
                "array has {} dimensions but layout '{}' expects {}",
                storage_shape.len(),
                self,
                self.ndim()
            )));
        }
        let mut dims = storage_shape.iter().copied();
        let mut next_optional = |present: bool| if present { dims.next() } else { Some(1) };
        let timesteps = next_optional(self.has_t).unwrap_or(1);
        let channels = next_optional(self.has_c).unwrap_or(1);
        let planes = next_optional(self.has_z).unwrap_or(1);
        let rows = dims.next().unwrap_or(0);
        let cols = dims.next().unwrap_or(0);
        Ok(AxisShape {
            rows,
            cols,
            planes,
            channels,
            timesteps,
        })
    }

    /// Storage-ordered ranges from per-axis logical ranges, dropping absent axes.
    pub fn storage_ranges(
        &self,
        times: Range,
        channels: Range,
        planes: Range,
        rows: Range,
        cols: Range,
    ) -> Vec<Range> {
        let mut ranges = Vec::with_capacity(self.ndim());
        if self.has_t {
            ranges.push(times);
        }
        if self.has_c {
            ranges.push(channels);
        }
        if self.has_z {
            ranges.push(planes);
        }
        ranges.push(rows);
        ranges.push(cols);
        ranges
    }

    /// Flat offset of `(t, c, z, y, x)` in a row-major buffer of `storage_shape`.
    ///
    /// Coordinates on absent axes are ignored.
    pub fn offset(&self, storage_shape: &[u64], t: u64, c: u64, z: u64, y: u64, x: u64) -> usize {
        let coords = self.storage_ranges(
            Range::single(t),
            Range::single(c),
            Range::single(z),
            Range::single(y),
            Range::single(x),
        );
        let mut offset = 0u64;
        for (range, &extent) in coords.iter().zip(storage_shape) {
            offset = offset * extent + range.start() as u64;
        }
        offset as usize
    }
}

impl fmt::Display for AxisLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.axis_names().concat())
    }
}

/// Full logical shape of a well array; absent axes have extent 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisShape {
    pub rows: u64,
    pub cols: u64,
    pub planes: u64,
    pub channels: u64,
    pub timesteps: u64,
}

impl AxisShape {
    /// Total number of elements.
    pub fn num_elements(&self) -> u64 {
        self.rows * self.cols * self.planes * self.channels * self.timesteps
    }
}

impl fmt::Display for AxisShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(t={}, c={}, z={}, y={}, x={})",
            self.timesteps, self.channels, self.planes, self.rows, self.cols
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layouts() {
        assert_eq!(AxisLayout::parse("tczyx").unwrap(), AxisLayout::TCZYX);
        assert_eq!(AxisLayout::parse("YX").unwrap(), AxisLayout::YX);
        let cyx = AxisLayout::parse("cyx").unwrap();
        assert!(cyx.has_c && !cyx.has_t && !cyx.has_z);
        assert_eq!(cyx.ndim(), 3);
        assert_eq!(cyx.to_string(), "cyx");
    }

    #[test]
    fn test_parse_rejects_bad_strings() {
        assert!(AxisLayout::parse("xy").is_err());
        assert!(AxisLayout::parse("ctyx").is_err());
        assert!(AxisLayout::parse("ccyx").is_err());
        assert!(AxisLayout::parse("qyx").is_err());
    }

    #[test]
    fn test_shape_from() {
        let shape = AxisLayout::TCZYX.shape_from(&[2, 3, 4, 50, 60]).unwrap();
        assert_eq!(shape.timesteps, 2);
        assert_eq!(shape.channels, 3);
        assert_eq!(shape.planes, 4);
        assert_eq!(shape.rows, 50);
        assert_eq!(shape.cols, 60);

        let shape = AxisLayout::parse("cyx").unwrap().shape_from(&[3, 5, 6]).unwrap();
        assert_eq!((shape.timesteps, shape.channels, shape.planes), (1, 3, 1));

        assert!(AxisLayout::YX.shape_from(&[1, 5, 6]).is_err());
    }

    #[test]
    fn test_offset() {
        let shape = [1, 2, 1, 3, 4];
        let layout = AxisLayout::TCZYX;
        assert_eq!(layout.offset(&shape, 0, 0, 0, 0, 0), 0);
        assert_eq!(layout.offset(&shape, 0, 0, 0, 1, 2), 6);
        assert_eq!(layout.offset(&shape, 0, 1, 0, 0, 0), 12);

        let yx = AxisLayout::YX;
        assert_eq!(yx.offset(&[3, 4], 0, 5, 0, 2, 1), 9);
    }
}

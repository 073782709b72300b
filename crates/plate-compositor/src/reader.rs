//! Typed region reads from well arrays.

use std::sync::Arc;

use crate::axes::AxisLayout;
use crate::composition::WellDescriptor;
use crate::error::{CompositorError, Result};
use crate::range::{format_ranges, Range};
use crate::storage::ArrayStorage;
use crate::types::{ElementType, ImageData};

/// Reads rectangular regions of well arrays as run-typed buffers.
///
/// The element type is fixed at construction; every buffer returned is of
/// that type or the read fails.
pub struct RegionReader {
    storage: Arc<dyn ArrayStorage>,
    element_type: ElementType,
    layout: AxisLayout,
}

impl RegionReader {
    /// Create a reader for the element type with run-wide `type_code`.
    ///
    /// Unknown codes fail here, before any storage access.
    pub fn new(storage: Arc<dyn ArrayStorage>, type_code: u16, layout: AxisLayout) -> Result<Self> {
        let element_type = ElementType::from_code(type_code)?;
        Ok(Self {
            storage,
            element_type,
            layout,
        })
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn layout(&self) -> AxisLayout {
        self.layout
    }

    /// Read a region of `well`.
    ///
    /// Optional axes default to their first index. Returns the buffer and its
    /// shape in storage axis order.
    pub fn read(
        &self,
        well: &WellDescriptor,
        rows: Range,
        cols: Range,
        planes: Option<Range>,
        channels: Option<Range>,
        times: Option<Range>,
    ) -> Result<(ImageData, Vec<u64>)> {
        let times = times.unwrap_or(Range::single(0));
        let channels = channels.unwrap_or(Range::single(0));
        let planes = planes.unwrap_or(Range::single(0));

        let shape = &well.shape;
        let checks = [
            (times, shape.timesteps),
            (channels, shape.channels),
            (planes, shape.planes),
            (rows, shape.rows),
            (cols, shape.cols),
        ];
        if checks.iter().any(|(range, extent)| !range.fits_within(*extent)) {
            let requested = format_ranges(&checks.map(|(range, _)| range));
            return Err(CompositorError::out_of_bounds(requested, shape.to_string()));
        }

        let ranges = self
            .layout
            .storage_ranges(times, channels, planes, rows, cols);
        let spans: Vec<Range> = ranges.iter().map(Range::bounding_span).collect();

        let data = self.storage.read_region(&well.handle, &spans)?;
        if data.element_type() != self.element_type {
            return Err(CompositorError::ElementTypeMismatch {
                expected: self.element_type.to_string(),
                found: data.element_type().to_string(),
            });
        }

        let out_shape: Vec<u64> = ranges.iter().map(Range::len).collect();
        if ranges.iter().all(Range::is_unit_step) {
            return Ok((data, out_shape));
        }

        let indices = strided_indices(&ranges, &spans);
        Ok((data.gather(&indices)?, out_shape))
    }

    /// Read the well's full declared extent.
    pub fn read_full(&self, well: &WellDescriptor) -> Result<(ImageData, Vec<u64>)> {
        let shape = &well.shape;
        self.read(
            well,
            Range::span(0, shape.rows),
            Range::span(0, shape.cols),
            Some(Range::span(0, shape.planes)),
            Some(Range::span(0, shape.channels)),
            Some(Range::span(0, shape.timesteps)),
        )
    }
}

/// Flat indices into a row-major buffer of `spans` selecting the elements
/// visited by `ranges`, in walk order.
fn strided_indices(ranges: &[Range], spans: &[Range]) -> Vec<usize> {
    let span_shape: Vec<u64> = spans.iter().map(Range::len).collect();
    let mut indices = vec![0usize];
    for ((range, span), &extent) in ranges.iter().zip(spans).zip(&span_shape) {
        let axis: Vec<u64> = range
            .indices()
            .map(|i| (i - span.start()) as u64)
            .collect();
        indices = indices
            .iter()
            .flat_map(|&base| {
                axis.iter()
                    .map(move |&offset| base * extent as usize + offset as usize)
            })
            .collect();
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strided_indices_unit() {
        let ranges = [Range::span(0, 2), Range::span(1, 3)];
        let spans = ranges.map(|r| r.bounding_span());
        assert_eq!(strided_indices(&ranges, &spans), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_strided_indices_step_and_reverse() {
        // 3x4 span, every other row, columns reversed
        let rows = Range::new(0, 3, 2).unwrap();
        let cols = Range::new(3, -1, -1).unwrap();
        let ranges = [rows, cols];
        let spans = ranges.map(|r| r.bounding_span());
        assert_eq!(spans[0].len(), 3);
        assert_eq!(spans[1].len(), 4);
        assert_eq!(
            strided_indices(&ranges, &spans),
            vec![3, 2, 1, 0, 11, 10, 9, 8]
        );
    }
}

//! Strided index ranges along one axis.

use std::fmt;

use crate::error::{CompositorError, Result};

/// A half-open index range `[start, stop)` walked with `step`.
///
/// Used for both source read windows and destination write windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    start: i64,
    stop: i64,
    step: i64,
}

impl Range {
    /// Create a range, rejecting a zero step or a step pointing away from `stop`.
    pub fn new(start: i64, stop: i64, step: i64) -> Result<Self> {
        if step == 0 {
            return Err(CompositorError::InvalidRange(format!(
                "{}:{}:{} has a zero step",
                start, stop, step
            )));
        }
        if (step > 0 && start > stop) || (step < 0 && start < stop) {
            return Err(CompositorError::InvalidRange(format!(
                "{}:{}:{} never reaches its stop",
                start, stop, step
            )));
        }
        Ok(Self { start, stop, step })
    }

    /// Unit-step range `[start, stop)`. An inverted pair yields an empty range.
    pub fn span(start: u64, stop: u64) -> Self {
        Self {
            start: start as i64,
            stop: stop.max(start) as i64,
            step: 1,
        }
    }

    /// The single index `index`.
    pub fn single(index: u64) -> Self {
        Self::span(index, index + 1)
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn stop(&self) -> i64 {
        self.stop
    }

    pub fn step(&self) -> i64 {
        self.step
    }

    /// Number of indices visited.
    pub fn len(&self) -> u64 {
        let distance = (self.stop - self.start).unsigned_abs();
        let step = self.step.unsigned_abs();
        (distance + step - 1) / step
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_unit_step(&self) -> bool {
        self.step == 1
    }

    /// Visited indices, in walk order.
    pub fn indices(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.len() as i64).map(move |i| self.start + i * self.step)
    }

    /// Smallest visited index.
    pub fn min_index(&self) -> Option<i64> {
        if self.is_empty() {
            return None;
        }
        let last = self.start + (self.len() as i64 - 1) * self.step;
        Some(self.start.min(last))
    }

    /// Largest visited index.
    pub fn max_index(&self) -> Option<i64> {
        if self.is_empty() {
            return None;
        }
        let last = self.start + (self.len() as i64 - 1) * self.step;
        Some(self.start.max(last))
    }

    /// Unit-step span covering every visited index.
    pub fn bounding_span(&self) -> Self {
        match (self.min_index(), self.max_index()) {
            (Some(lo), Some(hi)) => Self {
                start: lo,
                stop: hi + 1,
                step: 1,
            },
            _ => Self {
                start: self.start,
                stop: self.start,
                step: 1,
            },
        }
    }

    /// Whether every visited index lies in `[0, extent)`.
    pub fn fits_within(&self, extent: u64) -> bool {
        match (self.min_index(), self.max_index()) {
            (Some(lo), Some(hi)) => lo >= 0 && (hi as u64) < extent,
            _ => self.start >= 0 && (self.start as u64) <= extent,
        }
    }

    /// `std::ops::Range` over the bounding span, for storage subsets.
    pub fn to_std(&self) -> std::ops::Range<u64> {
        let span = self.bounding_span();
        span.start.max(0) as u64..span.stop.max(0) as u64
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.stop, self.step)
    }
}

/// Render a list of ranges as `[a:b:c, ...]`.
pub fn format_ranges(ranges: &[Range]) -> String {
    let parts: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_step_rejected() {
        assert!(Range::new(0, 10, 0).is_err());
        assert!(Range::new(10, 0, 1).is_err());
        assert!(Range::new(0, 10, -1).is_err());
    }

    #[test]
    fn test_len() {
        assert_eq!(Range::span(0, 10).len(), 10);
        assert_eq!(Range::new(0, 10, 3).unwrap().len(), 4);
        assert_eq!(Range::new(9, -1, -2).unwrap().len(), 5);
        assert_eq!(Range::span(5, 5).len(), 0);
        assert_eq!(Range::single(7).len(), 1);
    }

    #[test]
    fn test_indices_and_bounds() {
        let r = Range::new(1, 8, 3).unwrap();
        assert_eq!(r.indices().collect::<Vec<_>>(), vec![1, 4, 7]);
        assert_eq!(r.bounding_span(), Range::span(1, 8));

        let r = Range::new(6, 0, -2).unwrap();
        assert_eq!(r.indices().collect::<Vec<_>>(), vec![6, 4, 2]);
        assert_eq!(r.min_index(), Some(2));
        assert_eq!(r.max_index(), Some(6));
        assert_eq!(r.to_std(), 2..7);
    }

    #[test]
    fn test_fits_within() {
        assert!(Range::span(0, 10).fits_within(10));
        assert!(!Range::span(0, 11).fits_within(10));
        assert!(!Range::new(-1, 3, 1).unwrap().fits_within(10));
        assert!(Range::new(0, 20, 5).unwrap().fits_within(16));
    }

    #[test]
    fn test_display() {
        assert_eq!(Range::span(2, 4).to_string(), "2:4:1");
        assert_eq!(
            format_ranges(&[Range::single(0), Range::span(0, 3)]),
            "[0:1:1, 0:3:1]"
        );
    }
}

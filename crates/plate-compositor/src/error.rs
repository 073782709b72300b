//! Error types for plate composition.

use thiserror::Error;

use crate::types::{ChunkCoord, WellId};

/// Broad classification of a [`CompositorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported element type, element type mismatch, invalid settings.
    Configuration,
    /// A requested grid cell is absent from the composition map.
    Layout,
    /// A read or write region lies outside a declared shape.
    Range,
    /// The storage engine failed to open, read or write.
    Io,
    /// An operation was called in the wrong run state.
    State,
}

/// Errors that can occur while composing a plate pyramid.
#[derive(Error, Debug)]
pub enum CompositorError {
    /// Element type name or code outside the ten supported numeric kinds.
    #[error("unsupported element type: {0}")]
    UnsupportedElementType(String),

    /// A well's element type differs from the one fixed for the run.
    #[error("element type mismatch: expected {expected}, found {found}")]
    ElementTypeMismatch { expected: String, found: String },

    /// Invalid configuration or pyramid parameters.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The requested grid cell has no composition map entry.
    #[error("no composition entry for grid cell (level {level}, row {row}, col {col})")]
    UnmappedCell { level: usize, row: u64, col: u64 },

    /// A range descriptor is malformed.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// The requested region is outside the declared shape.
    #[error("requested region {requested} is outside bounds {bounds}")]
    OutOfBounds { requested: String, bounds: String },

    /// Failed to open an array.
    #[error("failed to open array {location}: {message}")]
    OpenFailed { location: String, message: String },

    /// Failed to read from an array.
    #[error("failed to read array {location}: {message}")]
    ReadFailed { location: String, message: String },

    /// Failed to write to an array.
    #[error("failed to write array {location}: {message}")]
    WriteFailed { location: String, message: String },

    /// Storage/IO error not tied to a single array.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Operation called before composition was installed, or state
    /// re-initialised without a reset.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Failure while loading a well.
    #[error("well {well} ({location}): {source}")]
    Well {
        well: WellId,
        location: String,
        #[source]
        source: Box<CompositorError>,
    },

    /// Failure while assembling or writing a chunk.
    #[error("chunk {coord}: {source}")]
    Chunk {
        coord: ChunkCoord,
        #[source]
        source: Box<CompositorError>,
    },
}

impl CompositorError {
    /// Create an OpenFailed error.
    pub fn open_failed(location: impl Into<String>, msg: impl ToString) -> Self {
        Self::OpenFailed {
            location: location.into(),
            message: msg.to_string(),
        }
    }

    /// Create a ReadFailed error.
    pub fn read_failed(location: impl Into<String>, msg: impl ToString) -> Self {
        Self::ReadFailed {
            location: location.into(),
            message: msg.to_string(),
        }
    }

    /// Create a WriteFailed error.
    pub fn write_failed(location: impl Into<String>, msg: impl ToString) -> Self {
        Self::WriteFailed {
            location: location.into(),
            message: msg.to_string(),
        }
    }

    /// Create an OutOfBounds error.
    pub fn out_of_bounds(requested: impl Into<String>, bounds: impl Into<String>) -> Self {
        Self::OutOfBounds {
            requested: requested.into(),
            bounds: bounds.into(),
        }
    }

    /// Create a ConfigError.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create an InvalidState error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a StorageError.
    pub fn storage_error(msg: impl ToString) -> Self {
        Self::StorageError(msg.to_string())
    }

    /// Attach the implicated well.
    pub fn for_well(self, well: WellId, location: impl Into<String>) -> Self {
        Self::Well {
            well,
            location: location.into(),
            source: Box::new(self),
        }
    }

    /// Attach the failing chunk coordinate.
    pub fn in_chunk(self, coord: ChunkCoord) -> Self {
        Self::Chunk {
            coord,
            source: Box::new(self),
        }
    }

    /// Classify the error, looking through well and chunk context.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedElementType(_)
            | Self::ElementTypeMismatch { .. }
            | Self::ConfigError(_) => ErrorKind::Configuration,
            Self::UnmappedCell { .. } => ErrorKind::Layout,
            Self::InvalidRange(_) | Self::OutOfBounds { .. } => ErrorKind::Range,
            Self::OpenFailed { .. }
            | Self::ReadFailed { .. }
            | Self::WriteFailed { .. }
            | Self::StorageError(_) => ErrorKind::Io,
            Self::InvalidState(_) => ErrorKind::State,
            Self::Well { source, .. } | Self::Chunk { source, .. } => source.kind(),
        }
    }

    /// The chunk coordinate attached to this error, if any.
    pub fn chunk(&self) -> Option<ChunkCoord> {
        match self {
            Self::Chunk { coord, .. } => Some(*coord),
            _ => None,
        }
    }

    /// The well attached to this error, searching through chunk context.
    pub fn well(&self) -> Option<WellId> {
        match self {
            Self::Well { well, .. } => Some(*well),
            Self::Chunk { source, .. } => source.well(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CompositorError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for CompositorError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}

/// Result type for compositor operations.
pub type Result<T> = std::result::Result<T, CompositorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_sees_through_context() {
        let coord = ChunkCoord::new(1, 0, 2, 3);
        let err = CompositorError::read_failed("wells/a", "boom")
            .for_well(WellId(4), "wells/a")
            .in_chunk(coord);

        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.chunk(), Some(coord));
        assert_eq!(err.well(), Some(WellId(4)));
    }

    #[test]
    fn test_error_messages() {
        let err = CompositorError::UnmappedCell {
            level: 0,
            row: 1,
            col: 2,
        };
        assert_eq!(err.kind(), ErrorKind::Layout);
        assert!(err.to_string().contains("row 1"));

        let err = CompositorError::out_of_bounds("[0:10:1]", "[0:5]");
        assert_eq!(err.kind(), ErrorKind::Range);
    }
}

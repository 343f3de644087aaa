//! Error types for chimap

use thiserror::Error;

/// Main error type for chimap operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("No channels extracted yet: cannot run {operation}")]
    EmptyNetwork { operation: &'static str },

    #[error("Source key {0} is not in the channel network")]
    UnknownSourceKey(usize),

    #[error("Basin key {0} is not in the channel network")]
    UnknownBasinKey(usize),

    #[error("Node {0} is not in the flow graph")]
    UnknownNode(usize),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Algorithm error: {0}")]
    Algorithm(String),
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Tiff(e.to_string())
    }
}

/// Result type alias for chimap operations
pub type Result<T> = std::result::Result<T, Error>;

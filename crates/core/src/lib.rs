//! # chimap core
//!
//! Core types for chi-space river profile analysis.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced raster grid backing DEM input
//! - `GeoTransform`: affine georeferencing
//! - `FlowGraph`: the read-only flow routing graph interface the chi
//!   engine consumes
//! - `KeyRegistry`: dense node↔key bookkeeping for sources and basins
//! - Error type shared across the workspace

pub mod error;
pub mod graph;
pub mod io;
pub mod keys;
pub mod raster;

pub use error::{Error, Result};
pub use graph::{ChiParams, FlowGraph, NodeId};
pub use keys::KeyRegistry;
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::graph::{ChiParams, FlowGraph, NodeId};
    pub use crate::keys::KeyRegistry;
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
}

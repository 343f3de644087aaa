//! # chimap algorithms
//!
//! Chi-space river profile analysis over a flow routing graph:
//!
//! - Flow routing: D8 directions, the drainage tree, network decomposition
//! - Chi engine: channel extraction, segment fitting, knickpoints,
//!   collinearity testing and concavity sweeps, slope-area analysis
//! - CSV export of every result table
//!
//! All heavy passes run in parallel when the `parallel` feature (enabled
//! by default) is on, and degrade to sequential execution when it is off.

pub mod chi;
pub mod export;
pub mod flow;

mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::chi::{
        assign_segment_ids, basin_collinearity, bin_slope_area, detect_knickpoints,
        extract_network, extract_network_chi_only, filter_knickpoints, slope_area_data,
        sweep_concavity, ChannelNetwork, ChannelSample, Knickpoint, SegmentParams, SweepParams,
        SweepResult,
    };
    pub use crate::flow::{decompose_network, flow_direction, ChannelTriple, FlowRouting};
    pub use chimap_core::prelude::*;
}

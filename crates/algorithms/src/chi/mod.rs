//! Chi-space channel analysis.
//!
//! - Network extraction with first-writer-wins node claiming
//! - Monte Carlo piecewise-linear segment fitting
//! - Knickpoint detection and spatial filtering
//! - Cross-tributary collinearity testing and concavity sweeps
//! - Slope-area analysis

pub mod collinearity;
pub mod extract;
pub mod knickpoint;
pub mod network;
pub mod segment;
pub mod slope_area;

pub use collinearity::{
    basin_collinearity, sweep_concavity, BasinCollinearity, CollinearityPair, SweepParams,
    SweepResult, SweepStep, DEFAULT_SIGMA,
};
pub use extract::{extract_network, extract_network_chi_only};
pub use knickpoint::{assign_segment_ids, detect_knickpoints, filter_knickpoints, Knickpoint};
pub use network::{ChannelNetwork, ChannelSample};
pub use segment::SegmentParams;
pub use slope_area::{bin_slope_area, slope_area_data, SlopeAreaBin, SlopeAreaPoint};

//! Flow routing services consumed by the chi engine.
//!
//! - D8 flow direction from a conditioned DEM
//! - `FlowRouting`: the directed drainage tree with per-node attributes
//! - Network decomposition into ordered source→outlet channels

mod decompose;
mod direction;
mod routing;

pub use decompose::{decompose_network, ChannelTriple};
pub use direction::flow_direction;
pub use routing::FlowRouting;

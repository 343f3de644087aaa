//! Flow routing graph interface.
//!
//! The chi analysis engine never owns the drainage network. It consumes a
//! read-only, fully-built flow routing graph through this trait: a directed
//! tree in which every node has exactly one receiver (itself for a
//! baselevel/outlet node) and the per-node attributes the engine needs.

use serde::{Deserialize, Serialize};

/// Dense node identifier issued by the flow routing graph.
pub type NodeId = usize;

/// Parameters of the chi coordinate transform.
///
/// Chi integrates `(reference_area / drainage_area)^concavity` along the
/// flow path from the outlet; `concavity` is the m/n ratio of the stream
/// power model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChiParams {
    /// Concavity exponent (m/n)
    pub concavity: f64,
    /// Reference drainage area A_0 (m²)
    pub reference_area: f64,
    /// Nodes with drainage area below this (m²) get no chi value
    pub area_threshold: f64,
}

impl Default for ChiParams {
    fn default() -> Self {
        Self {
            concavity: 0.5,
            reference_area: 1.0,
            area_threshold: 0.0,
        }
    }
}

impl ChiParams {
    /// Chi transform at a fixed concavity, keeping the other parameters
    pub fn with_concavity(&self, concavity: f64) -> Self {
        Self { concavity, ..*self }
    }
}

/// Read-only view of a flow routing graph.
///
/// Node ids are dense (`0..node_count()`). The receiver relation forms a
/// forest rooted at baselevel nodes, which are their own receivers.
pub trait FlowGraph {
    /// Number of nodes in the graph
    fn node_count(&self) -> usize;

    /// The downstream node this node drains to; `node` itself if baselevel
    fn receiver_of(&self, node: NodeId) -> NodeId;

    /// Grid position of the node
    fn row_col_of(&self, node: NodeId) -> (usize, usize);

    /// Planform coordinates of the node (projected x, y in map units)
    fn xy_of(&self, node: NodeId) -> (f64, f64);

    /// Geographic coordinates of the node as (latitude, longitude)
    fn latlon_of(&self, node: NodeId) -> (f64, f64);

    /// Surface elevation at the node (m)
    fn elevation(&self, node: NodeId) -> f64;

    /// Upslope contributing area at the node (m²)
    fn drainage_area(&self, node: NodeId) -> f64;

    /// Along-flow distance from the node to its basin outlet (m)
    fn distance_from_outlet(&self, node: NodeId) -> f64;

    /// Baselevel node of the basin containing this node
    fn basin_of(&self, node: NodeId) -> NodeId;

    /// Compute the chi coordinate for every node.
    ///
    /// Returns one value per node id; nodes below the area threshold get NaN.
    fn chi(&self, params: &ChiParams) -> Vec<f64>;

    /// Whether the node is its own receiver
    fn is_baselevel(&self, node: NodeId) -> bool {
        self.receiver_of(node) == node
    }
}

//! Knickpoint detection from segmented chi-elevation fits.
//!
//! A knickpoint is a transition in channel steepness between consecutive
//! nodes of the same channel. Detection walks the extraction sequence once,
//! comparing each node's m_chi to its upstream neighbour's; transitions
//! across channel boundaries are not knickpoints and reset the comparison.
//! An optional spatial non-maximum suppression pass keeps only the locally
//! strongest transitions.

use crate::chi::network::ChannelNetwork;
use chimap_core::graph::{FlowGraph, NodeId};
use chimap_core::{Error, Result};
use std::collections::BTreeMap;
use tracing::debug;

/// One steepness transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knickpoint {
    /// Absolute change in m_chi across the transition
    pub magnitude: f64,
    /// Upstream/downstream m_chi ratio; `None` when the downstream
    /// steepness is zero and the ratio is undefined
    pub ratio: Option<f64>,
    /// +1 where steepness drops downstream, -1 where it grows
    pub sign: i8,
}

/// Assign a dense segment id to every node of the network.
///
/// Ids count fitted-segment changes along the extraction sequence, so
/// nodes sharing an id share one (m_chi, b_chi) pair. Returns the number
/// of segments.
pub fn assign_segment_ids(network: &mut ChannelNetwork) -> Result<usize> {
    if network.is_empty() {
        return Err(Error::EmptyNetwork {
            operation: "segment id assignment",
        });
    }

    let sequence: Vec<NodeId> = network.node_sequence().to_vec();
    let mut segment_id = 0usize;
    let mut last_m = 0.0;
    for (i, node) in sequence.into_iter().enumerate() {
        let m = network.sample(node).map(|s| s.m_chi).unwrap_or(0.0);
        if i > 0 && m != last_m {
            segment_id += 1;
        }
        last_m = m;
        if let Some(sample) = network.sample_mut(node) {
            sample.segment_id = Some(segment_id);
        }
    }
    Ok(segment_id + 1)
}

/// Detect steepness transitions along the extraction sequence.
///
/// Negative m_chi values are clamped to zero before comparison (a fitted
/// segment sloping downhill upstream carries no steepness information),
/// except at the very first node of the sequence. Returns the transitions
/// keyed by the node at which they occur.
pub fn detect_knickpoints(network: &ChannelNetwork) -> Result<BTreeMap<NodeId, Knickpoint>> {
    if network.is_empty() {
        return Err(Error::EmptyNetwork {
            operation: "knickpoint detection",
        });
    }

    let mut knickpoints = BTreeMap::new();
    let sequence = network.node_sequence();

    let first = network.sample(sequence[0]).unwrap();
    let mut last_key = first.source_key;
    let mut last_m = first.m_chi;

    for &node in &sequence[1..] {
        let sample = network.sample(node).unwrap();
        let this_m = sample.m_chi.max(0.0);

        if sample.source_key != last_key {
            // new channel: restart the comparison, no transition recorded
            last_key = sample.source_key;
            last_m = this_m;
            continue;
        }

        if this_m != last_m {
            let delta = last_m - this_m;
            let ratio = (this_m != 0.0).then(|| last_m / this_m);
            knickpoints.insert(
                node,
                Knickpoint {
                    magnitude: delta.abs(),
                    ratio,
                    sign: if delta > 0.0 { 1 } else { -1 },
                },
            );
            last_m = this_m;
        }
    }

    debug!(count = knickpoints.len(), "detected knickpoints");
    Ok(knickpoints)
}

/// Drop every knickpoint that has a strictly stronger neighbour within
/// `window` map units (planform distance). Ties keep the transition that
/// appears earlier in the extraction sequence.
pub fn filter_knickpoints<G: FlowGraph>(
    network: &ChannelNetwork,
    graph: &G,
    knickpoints: &BTreeMap<NodeId, Knickpoint>,
    window: f64,
) -> BTreeMap<NodeId, Knickpoint> {
    let mut order: BTreeMap<NodeId, usize> = BTreeMap::new();
    for (i, &node) in network.node_sequence().iter().enumerate() {
        order.insert(node, i);
    }

    let entries: Vec<(NodeId, Knickpoint, (f64, f64))> = knickpoints
        .iter()
        .map(|(&node, &kp)| (node, kp, graph.xy_of(node)))
        .collect();

    let mut kept = BTreeMap::new();
    'outer: for (node, kp, (x, y)) in &entries {
        for (other, other_kp, (ox, oy)) in &entries {
            if other == node {
                continue;
            }
            let dist = ((x - ox).powi(2) + (y - oy).powi(2)).sqrt();
            if dist > window {
                continue;
            }
            if other_kp.magnitude > kp.magnitude {
                continue 'outer;
            }
            if other_kp.magnitude == kp.magnitude && order[other] < order[node] {
                continue 'outer;
            }
        }
        kept.insert(*node, *kp);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chi::network::ChannelSample;
    use chimap_core::graph::{ChiParams, FlowGraph, NodeId};

    fn sample(m_chi: f64, source_key: usize) -> ChannelSample {
        ChannelSample {
            chi: 0.0,
            elevation: 0.0,
            drainage_area: 1.0,
            flow_distance: 0.0,
            m_chi,
            b_chi: 0.0,
            fitted_elevation: 0.0,
            source_key,
            basin_key: 0,
            segment_id: None,
        }
    }

    fn network_of(slopes: &[(f64, usize)]) -> ChannelNetwork {
        let mut net = ChannelNetwork::new();
        for (node, &(m, key)) in slopes.iter().enumerate() {
            net.insert_if_absent(node, sample(m, key));
        }
        net
    }

    /// Nodes laid out on a line, one map unit apart.
    struct LineGraph(usize);

    impl FlowGraph for LineGraph {
        fn node_count(&self) -> usize {
            self.0
        }
        fn receiver_of(&self, node: NodeId) -> NodeId {
            (node + 1).min(self.0 - 1)
        }
        fn row_col_of(&self, node: NodeId) -> (usize, usize) {
            (0, node)
        }
        fn xy_of(&self, node: NodeId) -> (f64, f64) {
            (node as f64, 0.0)
        }
        fn latlon_of(&self, node: NodeId) -> (f64, f64) {
            (0.0, node as f64)
        }
        fn elevation(&self, _: NodeId) -> f64 {
            0.0
        }
        fn drainage_area(&self, _: NodeId) -> f64 {
            1.0
        }
        fn distance_from_outlet(&self, node: NodeId) -> f64 {
            (self.0 - 1 - node) as f64
        }
        fn basin_of(&self, _: NodeId) -> NodeId {
            self.0 - 1
        }
        fn chi(&self, _: &ChiParams) -> Vec<f64> {
            vec![0.0; self.0]
        }
    }

    #[test]
    fn uniform_channel_has_no_knickpoints() {
        let net = network_of(&[(2.0, 0); 6]);
        let kps = detect_knickpoints(&net).unwrap();
        assert!(kps.is_empty());
    }

    #[test]
    fn transition_is_recorded_with_ratio_and_sign() {
        let net = network_of(&[(4.0, 0), (4.0, 0), (1.0, 0), (1.0, 0)]);
        let kps = detect_knickpoints(&net).unwrap();
        assert_eq!(kps.len(), 1);
        let kp = kps.get(&2).unwrap();
        assert_eq!(kp.magnitude, 3.0);
        assert_eq!(kp.ratio, Some(4.0));
        assert_eq!(kp.sign, 1);
    }

    #[test]
    fn zero_downstream_steepness_has_no_ratio() {
        let net = network_of(&[(2.0, 0), (0.0, 0)]);
        let kps = detect_knickpoints(&net).unwrap();
        let kp = kps.get(&1).unwrap();
        assert_eq!(kp.ratio, None);
        assert_eq!(kp.magnitude, 2.0);
    }

    #[test]
    fn negative_steepness_is_clamped() {
        let net = network_of(&[(3.0, 0), (-1.0, 0), (-1.0, 0)]);
        let kps = detect_knickpoints(&net).unwrap();
        // -1 compares as 0: one transition of magnitude 3
        assert_eq!(kps.len(), 1);
        assert_eq!(kps.get(&1).unwrap().magnitude, 3.0);
    }

    #[test]
    fn channel_boundary_is_not_a_knickpoint() {
        let net = network_of(&[(5.0, 0), (5.0, 0), (9.0, 1), (9.0, 1)]);
        let kps = detect_knickpoints(&net).unwrap();
        assert!(kps.is_empty());
    }

    #[test]
    fn empty_network_is_an_error() {
        let net = ChannelNetwork::new();
        assert!(matches!(
            detect_knickpoints(&net),
            Err(Error::EmptyNetwork { .. })
        ));
    }

    #[test]
    fn segment_ids_are_dense() {
        let mut net = network_of(&[(2.0, 0), (2.0, 0), (5.0, 0), (5.0, 0), (1.0, 0)]);
        let count = assign_segment_ids(&mut net).unwrap();
        assert_eq!(count, 3);
        let ids: Vec<_> = (0..5)
            .map(|n| net.sample(n).unwrap().segment_id.unwrap())
            .collect();
        assert_eq!(ids, vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn suppression_keeps_the_strongest_neighbour() {
        // two knickpoints one unit apart, a third far away
        let net = network_of(&[
            (8.0, 0),
            (5.0, 0), // magnitude 3
            (0.5, 0), // magnitude 4.5
            (0.5, 0),
            (0.5, 0),
            (0.5, 0),
            (0.5, 0),
            (0.5, 0),
            (2.5, 0), // magnitude 2
        ]);
        let graph = LineGraph(9);
        let kps = detect_knickpoints(&net).unwrap();
        assert_eq!(kps.len(), 3);

        let kept = filter_knickpoints(&net, &graph, &kps, 2.0);
        assert!(kept.contains_key(&2));
        assert!(!kept.contains_key(&1));
        assert!(kept.contains_key(&8));
    }

    #[test]
    fn equal_magnitudes_keep_the_earlier_node() {
        let net = network_of(&[(3.0, 0), (1.0, 0), (3.0, 0)]);
        let graph = LineGraph(3);
        let kps = detect_knickpoints(&net).unwrap();
        assert_eq!(kps.len(), 2);

        let kept = filter_knickpoints(&net, &graph, &kps, 5.0);
        assert_eq!(kept.len(), 1);
        assert!(kept.contains_key(&1));
    }
}

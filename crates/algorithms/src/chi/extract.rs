//! Channel network extraction in chi space.
//!
//! Consumes the (source, outlet, basin) triples of the network
//! decomposition in order and walks each channel from its head to the
//! basin outlet. Nodes already claimed by an earlier channel keep their
//! first writer's values, so shared trunk reaches belong to the first
//! (mainstem) channel that traversed them and tributaries stop
//! contributing data at their junctions.

use crate::chi::network::{ChannelNetwork, ChannelSample};
use crate::chi::segment::{SegmentFitter, SegmentParams};
use crate::flow::ChannelTriple;
use chimap_core::graph::{FlowGraph, NodeId};
use chimap_core::Result;
use tracing::{debug, warn};

/// Extract the channel network and fit chi-elevation segments.
///
/// `chi_values` is the per-node chi coordinate (see [`FlowGraph::chi`]).
/// Triples must be ordered basin-major with each basin's mainstem first,
/// as produced by [`crate::flow::decompose_network`].
pub fn extract_network<G: FlowGraph>(
    graph: &G,
    triples: &[ChannelTriple],
    chi_values: &[f64],
    params: &SegmentParams,
) -> Result<ChannelNetwork> {
    let mut fitter = SegmentFitter::new(params.clone());
    let network = extract_inner(graph, triples, chi_values, Some(&mut fitter));
    debug!(
        channels = network.channel_count(),
        basins = network.basin_count(),
        nodes = network.len(),
        "extracted channel network"
    );
    Ok(network)
}

/// Extract the channel network without segment fitting.
///
/// Samples carry chi, elevation and the key bookkeeping but no steepness;
/// this is the fast path for concavity sweeps, where only channel profiles
/// in chi-elevation space are needed.
pub fn extract_network_chi_only<G: FlowGraph>(
    graph: &G,
    triples: &[ChannelTriple],
    chi_values: &[f64],
) -> Result<ChannelNetwork> {
    Ok(extract_inner(graph, triples, chi_values, None))
}

fn extract_inner<G: FlowGraph>(
    graph: &G,
    triples: &[ChannelTriple],
    chi_values: &[f64],
    mut fitter: Option<&mut SegmentFitter>,
) -> ChannelNetwork {
    let mut network = ChannelNetwork::new();
    let mut channel = Vec::new();
    let mut chi = Vec::new();
    let mut elevation = Vec::new();

    for triple in triples {
        walk_channel(graph, triple, &mut channel);

        // a head below the chi area threshold has no chi value; the channel
        // starts at its first node carrying one
        let skip = channel
            .iter()
            .take_while(|&&n| chi_values[n].is_nan())
            .count();
        if skip == channel.len() {
            warn!(
                source = triple.source,
                "channel lies entirely below the chi area threshold, skipping"
            );
            continue;
        }

        let source_key = network.source_keys.insert_or_get(channel[skip]);
        let basin_key = network.basin_keys.insert_or_get(triple.basin);

        chi.clear();
        elevation.clear();
        for &node in &channel[skip..] {
            chi.push(chi_values[node]);
            elevation.push(graph.elevation(node));
        }

        let fit = fitter.as_deref_mut().map(|f| f.fit_channel(&chi, &elevation));

        for (i, &node) in channel[skip..].iter().enumerate() {
            let (m_chi, b_chi, fitted_elevation) = match &fit {
                Some(fit) => (
                    fit.m_chi[i],
                    fit.b_chi[i],
                    fit.m_chi[i] * chi[i] + fit.b_chi[i],
                ),
                None => (0.0, 0.0, f64::NAN),
            };
            network.insert_if_absent(
                node,
                ChannelSample {
                    chi: chi[i],
                    elevation: elevation[i],
                    drainage_area: graph.drainage_area(node),
                    flow_distance: graph.distance_from_outlet(node),
                    m_chi,
                    b_chi,
                    fitted_elevation,
                    source_key,
                    basin_key,
                    segment_id: None,
                },
            );
        }
    }

    network
}

/// Collect the node path from a channel head to its basin outlet.
fn walk_channel<G: FlowGraph>(graph: &G, triple: &ChannelTriple, out: &mut Vec<NodeId>) {
    out.clear();
    let mut node = triple.source;
    loop {
        out.push(node);
        if node == triple.outlet {
            return;
        }
        let receiver = graph.receiver_of(node);
        if receiver == node {
            // reached baselevel before the declared outlet; keep the
            // fragment walked so far
            warn!(
                source = triple.source,
                outlet = triple.outlet,
                reached = node,
                "channel head does not drain to its declared outlet"
            );
            return;
        }
        node = receiver;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{decompose_network, flow_direction, FlowRouting};
    use chimap_core::graph::ChiParams;
    use chimap_core::raster::{GeoTransform, Raster};

    /// Two channels joining into a common trunk on a 6x3 grid, outlet at
    /// the bottom edge.
    fn y_routing() -> FlowRouting {
        let mut dem = Raster::from_vec(
            vec![
                50.0, -9999.0, 52.0, //
                40.0, -9999.0, 42.0, //
                -9999.0, 30.0, -9999.0, //
                -9999.0, 20.0, -9999.0, //
                -9999.0, 10.0, -9999.0, //
                -9999.0, 0.0, -9999.0, //
            ],
            6,
            3,
        )
        .unwrap();
        dem.set_transform(GeoTransform::new(0.0, 0.0, 10.0, -10.0));
        dem.set_nodata(Some(-9999.0));
        let fdir = flow_direction(&dem).unwrap();
        FlowRouting::build(&dem, &fdir).unwrap()
    }

    #[test]
    fn trunk_belongs_to_first_channel() {
        let routing = y_routing();
        let triples = decompose_network(&routing, 0.0);
        assert_eq!(triples.len(), 2);

        let chi = routing.chi(&ChiParams::default());
        let net = extract_network_chi_only(&routing, &triples, &chi).unwrap();

        // every valid cell is claimed exactly once
        assert_eq!(net.len(), routing.node_count());
        assert_eq!(net.channel_count(), 2);
        assert_eq!(net.basin_count(), 1);

        // trunk nodes carry the first (mainstem) source key
        let trunk = routing.node_at(2, 1).unwrap();
        assert_eq!(net.sample(trunk).unwrap().source_key, 0);

        // the second channel only owns its private headwater reach
        let second_source = net.source_node_of_key(1).unwrap();
        let owned: Vec<_> = net
            .node_sequence()
            .iter()
            .filter(|n| net.sample(**n).unwrap().source_key == 1)
            .copied()
            .collect();
        assert!(owned.contains(&second_source));
        assert!(!owned.contains(&trunk));
    }

    #[test]
    fn full_extraction_fits_segments() {
        let routing = y_routing();
        let triples = decompose_network(&routing, 0.0);
        let chi = routing.chi(&ChiParams::default());

        let net = extract_network(&routing, &triples, &chi, &SegmentParams::default()).unwrap();
        for node in net.node_sequence() {
            let s = net.sample(*node).unwrap();
            assert!(s.fitted_elevation.is_finite());
            assert!(s.m_chi >= 0.0);
        }
    }

    #[test]
    fn trimmed_heads_keep_registry_and_samples_consistent() {
        // decomposition threshold below the chi area threshold: heads carry
        // NaN chi and must not own source keys
        let routing = y_routing();
        let triples = decompose_network(&routing, 0.0);
        let params = ChiParams {
            area_threshold: 250.0, // cells are 10x10 m, heads drain 100-200 m²
            ..Default::default()
        };
        let chi = routing.chi(&params);
        let net = extract_network_chi_only(&routing, &triples, &chi).unwrap();

        assert!(!net.is_empty());
        for (key, node) in net.source_keys().iter() {
            let sample = net.sample(node).expect("source key without a sample");
            assert!(sample.chi.is_finite(), "source of key {} has NaN chi", key);
        }
        // grouping works instead of aborting
        let ranges = net.basin_source_ranges().unwrap();
        assert_eq!(ranges.len(), net.basin_count());
    }

    #[test]
    fn fully_trimmed_network_issues_no_keys() {
        let routing = y_routing();
        let triples = decompose_network(&routing, 0.0);
        let params = ChiParams {
            area_threshold: 1.0e9,
            ..Default::default()
        };
        let chi = routing.chi(&params);
        let net = extract_network_chi_only(&routing, &triples, &chi).unwrap();
        assert!(net.is_empty());
        assert_eq!(net.channel_count(), 0);
        assert_eq!(net.basin_count(), 0);
    }

    #[test]
    fn chi_only_extraction_has_no_fit() {
        let routing = y_routing();
        let triples = decompose_network(&routing, 0.0);
        let chi = routing.chi(&ChiParams::default());

        let net = extract_network_chi_only(&routing, &triples, &chi).unwrap();
        let head = net.source_node_of_key(0).unwrap();
        assert!(net.sample(head).unwrap().fitted_elevation.is_nan());
        assert_eq!(net.sample(head).unwrap().m_chi, 0.0);
    }
}

//! Channel network decomposition.
//!
//! Produces the ordered (source, outlet, basin) triples the channel
//! extractor consumes. Channel cells are those at or above a drainage-area
//! threshold; a source is a channel cell with no channel donors.
//!
//! Ordering contract relied on downstream: triples are contiguous per
//! basin, and within a basin the longest channel comes first, so the first
//! source key of every basin is its mainstem.

use crate::flow::routing::FlowRouting;
use chimap_core::graph::{FlowGraph, NodeId};

/// One source-to-outlet channel of the decomposed network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTriple {
    /// Most upstream node of the channel
    pub source: NodeId,
    /// Node the extraction walk stops at (the basin's baselevel node)
    pub outlet: NodeId,
    /// Baselevel node identifying the basin
    pub basin: NodeId,
}

/// Decompose the network into source→outlet channels.
///
/// `channel_area_threshold` is the contributing area (m²) above which a
/// cell counts as channelized. Basins with no channel cells produce no
/// triples.
pub fn decompose_network(routing: &FlowRouting, channel_area_threshold: f64) -> Vec<ChannelTriple> {
    let n = routing.node_count();
    let is_channel = |node: NodeId| routing.drainage_area(node) >= channel_area_threshold;

    let mut sources: Vec<NodeId> = (0..n)
        .filter(|&node| {
            is_channel(node) && !routing.donors_of(node).iter().any(|&d| is_channel(d))
        })
        .collect();

    // Contiguous per basin, mainstem (longest flow path) first within it.
    sources.sort_by(|&a, &b| {
        routing
            .basin_of(a)
            .cmp(&routing.basin_of(b))
            .then_with(|| {
                routing
                    .distance_from_outlet(b)
                    .partial_cmp(&routing.distance_from_outlet(a))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.cmp(&b))
    });

    sources
        .into_iter()
        .map(|source| {
            let basin = routing.basin_of(source);
            ChannelTriple {
                source,
                outlet: basin,
                basin,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::direction::flow_direction;
    use chimap_core::{GeoTransform, Raster};

    /// Y-shaped network: two headwater columns joining into one trunk.
    fn y_network() -> FlowRouting {
        // 6x3 grid; cols 0 and 2 drain diagonally into col 1 at row 2,
        // then south along col 1.
        let mut dem = Raster::new(6, 3);
        dem.set_transform(GeoTransform::new(0.0, 6.0, 1.0, -1.0));
        for row in 0..6 {
            for col in 0..3 {
                let z = (6 - row) as f64 * 10.0 + if col == 1 { 0.0 } else { 5.0 };
                dem.set(row, col, z).unwrap();
            }
        }
        let fdir = flow_direction(&dem).unwrap();
        FlowRouting::build(&dem, &fdir).unwrap()
    }

    #[test]
    fn test_sources_are_channel_heads() {
        let routing = y_network();
        // Threshold of one cell: every node is channelized, so sources are
        // exactly the cells with no donors at all.
        let triples = decompose_network(&routing, 0.0);
        for t in &triples {
            assert!(routing.donors_of(t.source).is_empty());
            assert_eq!(t.basin, routing.basin_of(t.source));
            assert!(routing.is_baselevel(t.outlet));
        }
    }

    #[test]
    fn test_triples_contiguous_per_basin_mainstem_first() {
        let routing = y_network();
        let triples = decompose_network(&routing, 0.0);

        // Basin blocks must be contiguous
        let mut seen = Vec::new();
        for t in &triples {
            if seen.last() != Some(&t.basin) {
                assert!(!seen.contains(&t.basin), "basin block split");
                seen.push(t.basin);
            }
        }

        // Within each basin the first triple has the longest flow path
        for basin in seen {
            let block: Vec<_> = triples.iter().filter(|t| t.basin == basin).collect();
            let first = routing.distance_from_outlet(block[0].source);
            for t in &block[1..] {
                assert!(routing.distance_from_outlet(t.source) <= first);
            }
        }
    }

    #[test]
    fn test_high_threshold_yields_trunk_sources() {
        let routing = y_network();
        // Only cells with at least 3 cells of contributing area qualify
        let triples = decompose_network(&routing, 3.0);
        assert!(!triples.is_empty());
        for t in &triples {
            assert!(routing.drainage_area(t.source) >= 3.0);
        }
    }
}

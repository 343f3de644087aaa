//! The channel network analysis result.
//!
//! One extraction pass produces one `ChannelNetwork`: the per-node sample
//! table, the traversal-ordered node sequence and the source/basin key
//! registries, all consistent with each other. Later stages (segment ids,
//! knickpoints, collinearity) read from it; only `update_chi` mutates it,
//! swapping chi values in place while keys and the channel decomposition
//! stay fixed.

use chimap_core::graph::{FlowGraph, NodeId};
use chimap_core::{Error, KeyRegistry, Result};
use std::collections::HashMap;
use std::ops::Range;

/// Per-node record of the extracted channel network.
#[derive(Debug, Clone, Copy)]
pub struct ChannelSample {
    /// Chi coordinate at the node
    pub chi: f64,
    /// Surface elevation (m)
    pub elevation: f64,
    /// Contributing area (m²)
    pub drainage_area: f64,
    /// Along-flow distance from the basin outlet (m)
    pub flow_distance: f64,
    /// Segment slope in chi-elevation space (channel steepness index)
    pub m_chi: f64,
    /// Segment intercept in chi-elevation space
    pub b_chi: f64,
    /// Elevation of the fitted segment at this node (NaN for chi-only passes)
    pub fitted_elevation: f64,
    /// Key of the channel that claimed this node
    pub source_key: usize,
    /// Key of the basin containing this node
    pub basin_key: usize,
    /// Dense segment number, assigned by the knickpoint pass
    pub segment_id: Option<usize>,
}

/// Channel network produced by one extraction pass.
#[derive(Debug, Clone, Default)]
pub struct ChannelNetwork {
    pub(crate) samples: HashMap<NodeId, ChannelSample>,
    pub(crate) node_sequence: Vec<NodeId>,
    pub(crate) source_keys: KeyRegistry,
    pub(crate) basin_keys: KeyRegistry,
}

impl ChannelNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a sample for `node` unless an earlier channel already claimed
    /// it. Returns whether the node was inserted.
    ///
    /// This is the first-writer-wins contract: the channel that reaches a
    /// node first, in triple processing order, owns its values.
    pub(crate) fn insert_if_absent(&mut self, node: NodeId, sample: ChannelSample) -> bool {
        use std::collections::hash_map::Entry;
        match self.samples.entry(node) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(sample);
                self.node_sequence.push(node);
                true
            }
        }
    }

    /// Number of nodes in the network
    pub fn len(&self) -> usize {
        self.node_sequence.len()
    }

    /// Whether any channels have been extracted
    pub fn is_empty(&self) -> bool {
        self.node_sequence.is_empty()
    }

    /// Node ids in traversal order
    pub fn node_sequence(&self) -> &[NodeId] {
        &self.node_sequence
    }

    /// Sample for a node, if the node is part of the network
    pub fn sample(&self, node: NodeId) -> Option<&ChannelSample> {
        self.samples.get(&node)
    }

    pub(crate) fn sample_mut(&mut self, node: NodeId) -> Option<&mut ChannelSample> {
        self.samples.get_mut(&node)
    }

    /// Number of extracted channels (source keys issued)
    pub fn channel_count(&self) -> usize {
        self.source_keys.len()
    }

    /// Number of basins (basin keys issued)
    pub fn basin_count(&self) -> usize {
        self.basin_keys.len()
    }

    /// Source node owning a source key.
    ///
    /// A missing key is a caller logic error, reported as a fatal error.
    pub fn source_node_of_key(&self, source_key: usize) -> Result<NodeId> {
        self.source_keys
            .node_of(source_key)
            .ok_or(Error::UnknownSourceKey(source_key))
    }

    /// Baselevel node owning a basin key.
    pub fn basin_node_of_key(&self, basin_key: usize) -> Result<NodeId> {
        self.basin_keys
            .node_of(basin_key)
            .ok_or(Error::UnknownBasinKey(basin_key))
    }

    /// Source key registry
    pub fn source_keys(&self) -> &KeyRegistry {
        &self.source_keys
    }

    /// Basin key registry
    pub fn basin_keys(&self) -> &KeyRegistry {
        &self.basin_keys
    }

    /// Partition the source keys into contiguous per-basin runs.
    ///
    /// `result[basin_key]` is the range of source keys whose channels drain
    /// to that basin. Sources are contiguous per basin by construction of
    /// the extractor's input ordering, so this is a single scan. A source
    /// key whose node carries no sample means the registries and the sample
    /// table disagree, which is a fatal error.
    pub fn basin_source_ranges(&self) -> Result<Vec<Range<usize>>> {
        let mut ranges: Vec<Range<usize>> = Vec::with_capacity(self.basin_keys.len());
        let mut current_basin = usize::MAX;
        for (source_key, source_node) in self.source_keys.iter() {
            let basin_key = self
                .samples
                .get(&source_node)
                .ok_or(Error::UnknownNode(source_node))?
                .basin_key;
            if basin_key != current_basin {
                debug_assert_eq!(basin_key, ranges.len(), "sources not contiguous per basin");
                ranges.push(source_key..source_key + 1);
                current_basin = basin_key;
            } else {
                ranges.last_mut().unwrap().end = source_key + 1;
            }
        }
        Ok(ranges)
    }

    /// Replace the chi value of every node in the network.
    ///
    /// `chi_values` is indexed by node id (as returned by
    /// [`FlowGraph::chi`]). Keys, sequence and the channel decomposition
    /// are preserved; only chi changes.
    pub fn update_chi(&mut self, chi_values: &[f64]) {
        for node in &self.node_sequence {
            if let Some(sample) = self.samples.get_mut(node) {
                sample.chi = chi_values[*node];
            }
        }
    }

    /// Ordered (chi, elevation) pairs of one channel, source to mouth.
    ///
    /// Walks receivers from the source node until a baselevel node is
    /// reached or the source key changes (a tributary junction): the shared
    /// downstream trunk belongs to the channel that claimed it first and is
    /// excluded here.
    pub fn channel_profile<G: FlowGraph>(
        &self,
        graph: &G,
        source_key: usize,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        let source = self.source_node_of_key(source_key)?;

        let mut chi = Vec::new();
        let mut elevation = Vec::new();
        let mut node = source;
        loop {
            match self.samples.get(&node) {
                Some(sample) if sample.source_key == source_key => {
                    chi.push(sample.chi);
                    elevation.push(sample.elevation);
                }
                _ => break,
            }
            let receiver = graph.receiver_of(node);
            if receiver == node {
                break;
            }
            node = receiver;
        }

        Ok((chi, elevation))
    }
}

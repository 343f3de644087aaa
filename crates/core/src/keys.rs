//! Dense key registries.
//!
//! The channel extractor hands out dense, zero-based keys for source and
//! baselevel nodes in first-encounter order. `KeyRegistry` keeps that
//! assignment as an ordered bijection: a vector of nodes indexed by key
//! plus the reverse map, so key→node lookups never rescan the network.

use crate::graph::NodeId;
use std::collections::HashMap;

/// Ordered bijective registry between nodes and dense keys.
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    nodes: Vec<NodeId>,
    key_of: HashMap<NodeId, usize>,
}

impl KeyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys issued so far
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no keys have been issued
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Key of `node` if it has one
    pub fn key_of(&self, node: NodeId) -> Option<usize> {
        self.key_of.get(&node).copied()
    }

    /// Node that owns `key`, if the key has been issued
    pub fn node_of(&self, key: usize) -> Option<NodeId> {
        self.nodes.get(key).copied()
    }

    /// Whether `node` already holds a key
    pub fn contains(&self, node: NodeId) -> bool {
        self.key_of.contains_key(&node)
    }

    /// Return the key of `node`, issuing the next dense key if unseen.
    pub fn insert_or_get(&mut self, node: NodeId) -> usize {
        if let Some(&key) = self.key_of.get(&node) {
            return key;
        }
        let key = self.nodes.len();
        self.nodes.push(node);
        self.key_of.insert(node, key);
        key
    }

    /// Iterate over (key, node) pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        self.nodes.iter().copied().enumerate()
    }

    /// Nodes in key order
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}

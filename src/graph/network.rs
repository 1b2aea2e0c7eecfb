//! network.rs
//! Ordered adjacency map of the drainage graph (forward or reversed).

use crate::error::{RoutingError, StructuralError};
use crate::store::{SegmentId, TerminalCode};
use serde::{Serialize, Deserialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

/// Neighbour list of one segment. Forward lists hold at most one entry when
/// built from topology rows; reversed lists hold the upstream tributaries.
pub type Adjacency = SmallVec<[SegmentId; 2]>;

/// Segment id -> directly connected segment ids.
///
/// Iteration is in ascending segment id, which makes every traversal built on
/// top of it deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    adj: BTreeMap<SegmentId, Adjacency>,
}

impl Network {
    pub fn new() -> Self { Self::default() }

    /// Builds the forward network from `(segment, downstream)` rows.
    ///
    /// A terminal downstream code (or a negative id) leaves the segment with an
    /// empty list, marking it a tailwater.
    pub fn build(
        rows: impl IntoIterator<Item = (SegmentId, i64)>,
        terminal: TerminalCode,
    ) -> Result<Self, RoutingError> {
        let mut adj = BTreeMap::new();
        for (src, dst) in rows {
            if adj.contains_key(&src) {
                return Err(RoutingError::DuplicateSegment(src));
            }
            let mut targets = Adjacency::new();
            if !terminal.is_terminal(dst) {
                if dst == src.value() {
                    return Err(StructuralError::SelfLoop(src).into());
                }
                targets.push(SegmentId(dst));
            }
            adj.insert(src, targets);
        }
        Ok(Self { adj })
    }

    /// Builds a network from raw adjacency lists without any validation.
    pub fn from_adjacency<I, L>(lists: I) -> Self
    where
        I: IntoIterator<Item = (SegmentId, L)>,
        L: IntoIterator<Item = SegmentId>,
    {
        let mut net = Self::new();
        for (src, targets) in lists {
            net.ensure_node(src);
            for dst in targets {
                net.insert_edge(src, dst);
            }
        }
        net
    }

    pub fn ensure_node(&mut self, id: SegmentId) {
        self.adj.entry(id).or_default();
    }

    pub fn insert_edge(&mut self, src: SegmentId, dst: SegmentId) {
        self.adj.entry(src).or_default().push(dst);
    }

    /// Reverses every edge.
    ///
    /// Every node of `self` becomes a key of the result: destination-free
    /// sources and nodes without predecessors keep explicit empty entries, so
    /// "is a leaf of the reversed graph" is a plain emptiness test.
    pub fn reverse(&self) -> Network {
        let mut rev: BTreeMap<SegmentId, Adjacency> = BTreeMap::new();
        for (&src, targets) in &self.adj {
            rev.entry(src).or_default();
            for &dst in targets {
                rev.entry(dst).or_default().push(src);
            }
        }
        Network { adj: rev }
    }

    /// Induced sub-adjacency over `nodes`.
    pub fn subnetwork(&self, nodes: &BTreeSet<SegmentId>) -> Network {
        let adj = self
            .adj
            .iter()
            .filter(|(k, _)| nodes.contains(k))
            .map(|(&k, v)| (k, v.iter().copied().filter(|n| nodes.contains(n)).collect()))
            .collect();
        Network { adj }
    }

    /// Neighbours of `id`; empty when `id` is not a key.
    #[inline(always)]
    pub fn neighbors(&self, id: SegmentId) -> &[SegmentId] {
        self.adj.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn get(&self, id: SegmentId) -> Option<&[SegmentId]> {
        self.adj.get(&id).map(|v| v.as_slice())
    }

    /// The single downstream target of `id` in a forward network.
    pub fn downstream_of(&self, id: SegmentId) -> Option<SegmentId> {
        self.neighbors(id).first().copied()
    }

    /// Upstream tributaries of `id`, when `self` is a reverse network.
    pub fn upstream_of(&self, id: SegmentId) -> &[SegmentId] {
        self.neighbors(id)
    }

    pub fn contains_key(&self, id: SegmentId) -> bool {
        self.adj.contains_key(&id)
    }

    pub fn len(&self) -> usize { self.adj.len() }
    pub fn is_empty(&self) -> bool { self.adj.is_empty() }

    pub fn keys(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.adj.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, &[SegmentId])> + '_ {
        self.adj.iter().map(|(&k, v)| (k, v.as_slice()))
    }

    pub fn edges(&self) -> impl Iterator<Item = (SegmentId, SegmentId)> + '_ {
        self.adj.iter().flat_map(|(&k, v)| v.iter().map(move |&d| (k, d)))
    }

    /// Keys plus every node that only appears as a target.
    pub fn nodes(&self) -> BTreeSet<SegmentId> {
        let mut nodes: BTreeSet<SegmentId> = self.adj.keys().copied().collect();
        nodes.extend(self.adj.values().flatten().copied());
        nodes
    }

    /// In-degree of every node, zeros included.
    pub fn in_degrees(&self) -> BTreeMap<SegmentId, usize> {
        let mut degrees: BTreeMap<SegmentId, usize> = self.nodes().into_iter().map(|n| (n, 0)).collect();
        for (_, dst) in self.edges() {
            *degrees.entry(dst).or_insert(0) += 1;
        }
        degrees
    }

    /// Out-degree of every node, zeros included.
    pub fn out_degrees(&self) -> BTreeMap<SegmentId, usize> {
        self.nodes()
            .into_iter()
            .map(|n| (n, self.neighbors(n).len()))
            .collect()
    }
}

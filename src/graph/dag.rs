//! dag.rs
//! Reach-level dependency graph and its Kahn ordering.

use super::decompose::ReachArena;
use super::network::Network;
use crate::error::StructuralError;
use crate::store::ReachId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::BTreeSet;

/// Edge `a -> b` means reach `a` drains into reach `b`, so `b` must wait for `a`.
#[derive(Debug, Clone, Default)]
pub struct ReachDependencyGraph {
    graph: DiGraph<ReachId, ()>,
}

impl ReachDependencyGraph {
    /// A graph over `count` reaches with no edges yet.
    pub fn with_reaches(count: usize) -> Self {
        let mut graph = DiGraph::with_capacity(count, count.saturating_sub(1));
        for i in 0..count {
            graph.add_node(ReachId::new(i));
        }
        Self { graph }
    }

    /// Links every reach to the reach its outlet drains into.
    ///
    /// `forward` is the downstream adjacency of the basin the arena was built from.
    pub fn build(arena: &ReachArena, forward: &Network) -> Self {
        let mut deps = Self::with_reaches(arena.len());
        for reach in arena.iter() {
            let target = forward.downstream_of(reach.outlet()).and_then(|t| arena.reach_of(t));
            if let Some(to) = target {
                if to != reach.id {
                    deps.add_dependency(reach.id, to);
                }
            }
        }
        deps
    }

    /// Records that `to` depends on `from`.
    pub fn add_dependency(&mut self, from: ReachId, to: ReachId) {
        self.graph.add_edge(NodeIndex::new(from.index()), NodeIndex::new(to.index()), ());
    }

    pub fn len(&self) -> usize { self.graph.node_count() }
    pub fn is_empty(&self) -> bool { self.graph.node_count() == 0 }
    pub fn edge_count(&self) -> usize { self.graph.edge_count() }

    pub fn downstream_reach(&self, id: ReachId) -> Option<ReachId> {
        self.graph
            .neighbors_directed(NodeIndex::new(id.index()), Direction::Outgoing)
            .next()
            .map(|n| self.graph[n])
    }

    /// Reaches draining directly into `id`, ascending.
    pub fn upstream_reaches(&self, id: ReachId) -> Vec<ReachId> {
        let mut ups: Vec<ReachId> = self
            .graph
            .neighbors_directed(NodeIndex::new(id.index()), Direction::Incoming)
            .map(|n| self.graph[n])
            .collect();
        ups.sort();
        ups
    }

    fn in_degrees(&self) -> Vec<usize> {
        self.graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect()
    }

    /// Returns a topological order using Kahn's Algorithm.
    ///
    /// Ready reaches are taken smallest id first.
    pub fn topological_order(&self) -> Result<Vec<ReachId>, StructuralError> {
        let count = self.graph.node_count();
        let mut in_degree = self.in_degrees();
        let mut order = Vec::with_capacity(count);

        // 1. Seed with every reach nothing drains into
        let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();

        // 2. Process
        while let Some(i) = ready.pop_first() {
            let node = NodeIndex::new(i);
            order.push(self.graph[node]);

            for child in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let c = child.index();
                in_degree[c] -= 1;
                if in_degree[c] == 0 {
                    ready.insert(c);
                }
            }
        }

        if order.len() != count {
            return Err(StructuralError::CyclicDependency { unprocessed: count - order.len(), total: count });
        }

        Ok(order)
    }

    /// Kahn wavefronts: every reach of a level has all of its upstream reaches
    /// in earlier levels, so the reaches of one level can run concurrently.
    pub fn execution_levels(&self) -> Result<Vec<Vec<ReachId>>, StructuralError> {
        let count = self.graph.node_count();
        let mut in_degree = self.in_degrees();
        let mut levels = Vec::new();
        let mut processed = 0;

        let mut current: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .collect();

        while !current.is_empty() {
            processed += current.len();
            let mut next = Vec::new();
            for &node in &current {
                for child in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    let c = child.index();
                    in_degree[c] -= 1;
                    if in_degree[c] == 0 {
                        next.push(child);
                    }
                }
            }
            next.sort();
            levels.push(current.iter().map(|&n| self.graph[n]).collect());
            current = next;
        }

        if processed != count {
            return Err(StructuralError::CyclicDependency { unprocessed: count - processed, total: count });
        }

        Ok(levels)
    }
}

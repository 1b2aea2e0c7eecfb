//! decompose.rs
//! Splits a basin into simple reaches: maximal unbranched chains whose
//! boundaries sit exactly at junctions, headwaters and tailwaters.

use super::network::Network;
use crate::analysis::topology::{headwaters, IndependentNetwork};
use crate::error::StructuralError;
use crate::store::{ReachId, SegmentId};
use serde::{Serialize, Deserialize};
use std::collections::{BTreeMap, BTreeSet};

/// An unbranched chain of segments, ordered upstream -> downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reach {
    pub id: ReachId,
    pub segments: Vec<SegmentId>,
}

impl Reach {
    /// Upstream-most segment; receives the reach's boundary inflow.
    pub fn head(&self) -> SegmentId { self.segments[0] }

    /// Downstream-most segment; its outflow leaves the reach.
    pub fn outlet(&self) -> SegmentId { self.segments[self.segments.len() - 1] }

    pub fn len(&self) -> usize { self.segments.len() }
    pub fn is_empty(&self) -> bool { self.segments.is_empty() }
}

/// Reach records addressed by `ReachId`, plus the segment -> reach owner map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReachArena {
    reaches: Vec<Reach>,
    owner: BTreeMap<SegmentId, ReachId>,
}

impl ReachArena {
    pub fn new() -> Self { Self::default() }

    fn push(&mut self, segments: Vec<SegmentId>) -> ReachId {
        let id = ReachId::new(self.reaches.len());
        for &s in &segments {
            self.owner.insert(s, id);
        }
        self.reaches.push(Reach { id, segments });
        id
    }

    pub fn len(&self) -> usize { self.reaches.len() }
    pub fn is_empty(&self) -> bool { self.reaches.is_empty() }

    #[inline(always)]
    pub fn get(&self, id: ReachId) -> &Reach { &self.reaches[id.index()] }

    pub fn iter(&self) -> impl Iterator<Item = &Reach> { self.reaches.iter() }

    pub fn reach_of(&self, segment: SegmentId) -> Option<ReachId> {
        self.owner.get(&segment).copied()
    }

    pub fn contains(&self, segment: SegmentId) -> bool {
        self.owner.contains_key(&segment)
    }

    pub fn segment_count(&self) -> usize { self.owner.len() }
}

/// Decomposes one independent network, rooted at its tailwater.
pub fn decompose_basin(basin: &IndependentNetwork) -> Result<ReachArena, StructuralError> {
    let mut arena = ReachArena::new();
    walk(&basin.reverse, basin.tailwater, &mut arena)?;
    Ok(arena)
}

/// Decomposes every basin of a reverse network into one arena, rooted at
/// each of its headwaters (the forward tailwaters) in ascending id.
pub fn decompose(reverse: &Network) -> Result<ReachArena, StructuralError> {
    let mut arena = ReachArena::new();
    for root in headwaters(reverse) {
        walk(reverse, root, &mut arena)?;
    }
    Ok(arena)
}

/// Depth-first walk upstream from `root` with an explicit stack of pending
/// reach outlets.
///
/// From each outlet the walk follows the single upstream predecessor while
/// there is exactly one; it stops on a junction (several predecessors) or a
/// leaf (none), including that node. The chain was collected downstream ->
/// upstream and is stored reversed. The stop node's predecessors become new
/// outlets, smallest id popped first.
fn walk(reverse: &Network, root: SegmentId, arena: &mut ReachArena) -> Result<(), StructuralError> {
    let mut stack: Vec<SegmentId> = vec![root];
    let mut seen: BTreeSet<SegmentId> = BTreeSet::new();

    while let Some(outlet) = stack.pop() {
        let mut chain = Vec::new();
        let mut current = outlet;

        loop {
            if arena.contains(current) || !seen.insert(current) {
                return Err(StructuralError::RevisitedSegment(current));
            }
            chain.push(current);

            match reverse.neighbors(current) {
                [single] => current = *single,
                upstream => {
                    stack.extend(upstream.iter().rev().copied());
                    break;
                }
            }
        }

        chain.reverse();
        arena.push(chain);
    }
    Ok(())
}

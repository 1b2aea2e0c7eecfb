use crate::error::StructuralError;
use crate::graph::Network;
use crate::store::SegmentId;
use std::collections::{BTreeMap, BTreeSet};

/// Keys that never appear as a target: sources with no upstream contributor.
pub fn headwaters(network: &Network) -> BTreeSet<SegmentId> {
    let targets: BTreeSet<SegmentId> = network.edges().map(|(_, d)| d).collect();
    network.keys().filter(|k| !targets.contains(k)).collect()
}

/// Sinks: targets that are not keys, plus keys with an empty list.
pub fn tailwaters(network: &Network) -> BTreeSet<SegmentId> {
    let mut sinks: BTreeSet<SegmentId> = network
        .edges()
        .map(|(_, d)| d)
        .filter(|d| !network.contains_key(*d))
        .collect();
    sinks.extend(network.iter().filter(|(_, n)| n.is_empty()).map(|(k, _)| k));
    sinks
}

/// Nodes with more than one incoming edge.
pub fn junctions(network: &Network) -> BTreeSet<SegmentId> {
    network
        .in_degrees()
        .into_iter()
        .filter(|&(_, d)| d > 1)
        .map(|(n, _)| n)
        .collect()
}

/// Every node reachable from `start` following the network's own edges.
///
/// On a reverse network this is the set of segments upstream of `start`.
pub fn reachable_from(network: &Network, start: &[SegmentId]) -> BTreeSet<SegmentId> {
    let mut visited = BTreeSet::new();
    let mut stack: Vec<SegmentId> = start.to_vec();

    while let Some(node) = stack.pop() {
        if visited.insert(node) {
            stack.extend(network.neighbors(node).iter().copied());
        }
    }
    visited
}

/// A basin draining to one tailwater, computable on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndependentNetwork {
    pub tailwater: SegmentId,
    /// Upstream adjacency restricted to this basin.
    pub reverse: Network,
    /// Downstream adjacency restricted to this basin.
    pub forward: Network,
}

impl IndependentNetwork {
    pub fn from_reverse(tailwater: SegmentId, reverse: Network) -> Self {
        let forward = reverse.reverse();
        Self { tailwater, reverse, forward }
    }

    pub fn segments(&self) -> BTreeSet<SegmentId> {
        self.reverse.nodes()
    }

    pub fn len(&self) -> usize {
        self.reverse.nodes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }
}

/// Splits a reverse network into one sub-network per tailwater.
///
/// Tailwaters of the forward graph are the headwaters of `reverse`; they are
/// processed in ascending id. With `check_disjoint`, a segment claimed by two
/// tailwaters is rejected. Segments claimed by none sit on a cycle with no
/// outlet and are always rejected.
pub fn independent_networks(
    reverse: &Network,
    check_disjoint: bool,
) -> Result<Vec<IndependentNetwork>, StructuralError> {
    let mut owner: BTreeMap<SegmentId, SegmentId> = BTreeMap::new();
    let mut networks = Vec::new();

    for tailwater in headwaters(reverse) {
        let members = reachable_from(reverse, &[tailwater]);

        for &node in &members {
            if let Some(&first) = owner.get(&node) {
                if check_disjoint {
                    return Err(StructuralError::SharedUpstream { segment: node, first, second: tailwater });
                }
            } else {
                owner.insert(node, tailwater);
            }
        }

        networks.push(IndependentNetwork::from_reverse(tailwater, reverse.subnetwork(&members)));
    }

    let all = reverse.nodes();
    if owner.len() < all.len() {
        let orphans: Vec<SegmentId> = all.into_iter().filter(|n| !owner.contains_key(n)).collect();
        return Err(StructuralError::Unrooted { count: orphans.len(), first: orphans[0] });
    }

    Ok(networks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::testing::{arb_forest, chain, confluence, two_basins};
    use proptest::prelude::*;

    fn set(v: &[i64]) -> BTreeSet<SegmentId> {
        v.iter().map(|&i| SegmentId(i)).collect()
    }

    #[test]
    fn test_classification_on_two_basins() {
        let net = two_basins();
        assert_eq!(headwaters(&net), set(&[1, 3, 10]));
        assert_eq!(tailwaters(&net), set(&[6, 10]));
        assert_eq!(junctions(&net), set(&[4]));
    }

    #[test]
    fn test_dangling_target_is_a_tailwater() {
        let net = Network::from_adjacency([(SegmentId(1), vec![SegmentId(2)])]);
        assert_eq!(tailwaters(&net), set(&[2]));
        assert_eq!(headwaters(&net), set(&[1]));
    }

    #[test]
    fn test_independent_networks_of_two_basins() {
        let nets = independent_networks(&two_basins().reverse(), true).unwrap();
        assert_eq!(nets.len(), 2);
        assert_eq!(nets[0].tailwater, SegmentId(6));
        assert_eq!(nets[0].segments(), set(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(nets[1].tailwater, SegmentId(10));
        assert_eq!(nets[1].segments(), set(&[10]));
        assert_eq!(nets[0].forward.downstream_of(SegmentId(2)), Some(SegmentId(4)));
    }

    #[test]
    fn test_shared_upstream_is_rejected_when_checking() {
        // Segment 1 drains to both 2 and 3: not representable.
        let forward = Network::from_adjacency([
            (SegmentId(1), vec![SegmentId(2), SegmentId(3)]),
            (SegmentId(2), vec![]),
            (SegmentId(3), vec![]),
        ]);
        let err = independent_networks(&forward.reverse(), true).unwrap_err();
        assert_eq!(
            err,
            StructuralError::SharedUpstream { segment: SegmentId(1), first: SegmentId(2), second: SegmentId(3) }
        );

        // Without the check both basins claim it.
        let nets = independent_networks(&forward.reverse(), false).unwrap();
        assert!(nets.iter().all(|n| n.segments().contains(&SegmentId(1))));
    }

    #[test]
    fn test_cycle_without_outlet_is_rejected() {
        let forward = Network::from_adjacency([
            (SegmentId(1), vec![SegmentId(2)]),
            (SegmentId(2), vec![SegmentId(1)]),
            (SegmentId(5), vec![]),
        ]);
        let err = independent_networks(&forward.reverse(), true).unwrap_err();
        assert_eq!(err, StructuralError::Unrooted { count: 2, first: SegmentId(1) });
    }

    #[test]
    fn test_queries_are_idempotent() {
        for net in [chain(), confluence(), two_basins()] {
            assert_eq!(headwaters(&net), headwaters(&net));
            assert_eq!(tailwaters(&net), tailwaters(&net));
            assert_eq!(junctions(&net), junctions(&net));
        }
    }

    proptest! {
        #[test]
        fn prop_independent_networks_partition_nodes(net in arb_forest()) {
            let nets = independent_networks(&net.reverse(), true).unwrap();
            let mut seen = BTreeSet::new();
            for n in &nets {
                for s in n.segments() {
                    prop_assert!(seen.insert(s), "segment {} claimed twice", s);
                }
            }
            prop_assert_eq!(seen, net.nodes());
        }

        #[test]
        fn prop_topology_queries_repeat_exactly(net in arb_forest()) {
            prop_assert_eq!(headwaters(&net), headwaters(&net.clone()));
            prop_assert_eq!(tailwaters(&net), tailwaters(&net.clone()));
            prop_assert_eq!(junctions(&net), junctions(&net.clone()));
        }
    }
}

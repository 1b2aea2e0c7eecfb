//! Shared fixtures for graph tests.

use super::network::Network;
use crate::store::{SegmentId, TerminalCode};
use proptest::prelude::*;

pub(crate) fn rows(pairs: &[(i64, i64)]) -> Network {
    Network::build(pairs.iter().map(|&(s, d)| (SegmentId(s), d)), TerminalCode(0))
        .expect("fixture rows are well formed")
}

/// 1 -> 2 -> 3 -> outlet
pub(crate) fn chain() -> Network {
    rows(&[(1, 2), (2, 3), (3, 0)])
}

/// 1 -> 3, 2 -> 3, 3 -> outlet
pub(crate) fn confluence() -> Network {
    rows(&[(1, 3), (2, 3), (3, 0)])
}

/// Two basins: a branched one draining to 6 and a lone segment 10.
///
/// ```text
///  1 -> 2 -\
///           4 -> 5 -> 6
///       3 -/
/// 10
/// ```
pub(crate) fn two_basins() -> Network {
    rows(&[(1, 2), (2, 4), (3, 4), (4, 5), (5, 6), (6, 0), (10, 0)])
}

prop_compose! {
    /// Random forest: every node points at a strictly larger id or at the outlet.
    pub(crate) fn arb_forest()(targets in prop::collection::vec(prop::option::of(1usize..40), 1..40)) -> Network {
        let rows = targets.iter().enumerate().map(|(i, t)| {
            let src = i as i64 + 1;
            let dst = match t { Some(off) => src + *off as i64, None => 0 };
            (SegmentId(src), dst)
        });
        Network::build(rows, TerminalCode(0)).expect("generated rows are acyclic")
    }
}

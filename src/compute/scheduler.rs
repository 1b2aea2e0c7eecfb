//! Execution plan of one independent network and its level-by-level dispatch.

use super::engine::{ReachExecutor, ReachOutcome};
use super::forcing::LoopForcing;
use super::kernel::RoutingKernel;
use super::ledger::SegmentSeries;
use crate::analysis::topology::IndependentNetwork;
use crate::assimilation::{FreshObservation, PersistenceRecord};
use crate::error::{RoutingError, StructuralError};
use crate::graph::{decompose_basin, ReachArena, ReachDependencyGraph};
use crate::store::{GaugeId, ReachId, SegmentId, SegmentState};
use rayon::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct NetworkSchedule {
    pub tailwater: SegmentId,
    pub arena: ReachArena,
    pub dependencies: ReachDependencyGraph,
    /// Kahn wavefronts over `dependencies`.
    pub levels: Vec<Vec<ReachId>>,
}

/// Merged reach outcomes of one network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkOutcome {
    pub series: BTreeMap<SegmentId, SegmentSeries>,
    pub final_states: BTreeMap<SegmentId, SegmentState>,
    pub gauge_updates: BTreeMap<GaugeId, FreshObservation>,
    pub persistence: BTreeMap<SegmentId, PersistenceRecord>,
}

impl NetworkOutcome {
    fn absorb(&mut self, reach: ReachOutcome) {
        self.series.extend(reach.series);
        self.final_states.extend(reach.final_states);
        self.gauge_updates.extend(reach.gauge_updates);
        self.persistence.extend(reach.persistence);
    }
}

impl NetworkSchedule {
    /// Decomposes `basin` into reaches and orders them.
    pub fn plan(basin: &IndependentNetwork) -> Result<Self, StructuralError> {
        let arena = decompose_basin(basin)?;
        let dependencies = ReachDependencyGraph::build(&arena, &basin.forward);
        let levels = dependencies.execution_levels()?;
        Ok(Self { tailwater: basin.tailwater, arena, dependencies, levels })
    }

    pub fn reach_count(&self) -> usize { self.arena.len() }
    pub fn segment_count(&self) -> usize { self.arena.segment_count() }

    pub fn contains(&self, segment: SegmentId) -> bool {
        self.arena.contains(segment)
    }

    /// Runs every level in order; the reaches of a level run in parallel and
    /// the next level starts only once all of them have published.
    pub fn run<K: RoutingKernel>(
        &self,
        executor: &ReachExecutor<K>,
        forcing: &LoopForcing,
        nts: usize,
    ) -> Result<NetworkOutcome, RoutingError> {
        let mut outlets: Vec<Option<Vec<f64>>> = vec![None; self.arena.len()];
        let mut outcome = NetworkOutcome::default();

        for level in &self.levels {
            let inflows = level
                .iter()
                .map(|&id| self.upstream_inflow(id, &outlets, nts))
                .collect::<Result<Vec<_>, _>>()?;

            let results = level
                .par_iter()
                .zip(inflows.par_iter())
                .map(|(&id, inflow)| executor.run(self.arena.get(id), inflow, forcing))
                .collect::<Result<Vec<_>, _>>()?;

            for reach in results {
                outlets[reach.reach.index()] = Some(reach.outlet_flow.clone());
                outcome.absorb(reach);
            }
        }
        Ok(outcome)
    }

    /// Sum of the outlet series of every reach draining into `id`.
    fn upstream_inflow(&self, id: ReachId, outlets: &[Option<Vec<f64>>], nts: usize) -> Result<Vec<f64>, RoutingError> {
        let mut inflow = vec![0.0; nts];
        for up in self.dependencies.upstream_reaches(id) {
            let series = outlets[up.index()]
                .as_ref()
                .ok_or(StructuralError::UnpublishedUpstream(id))?;
            for (acc, q) in inflow.iter_mut().zip(series) {
                *acc += q;
            }
        }
        Ok(inflow)
    }
}

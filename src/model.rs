//! Loop orchestration: plan once, then run simulation loops that thread the
//! assimilation state from one to the next.

use crate::analysis::telemetry::TopologyReport;
use crate::analysis::topology::independent_networks;
use crate::assimilation::{AssimilationState, FreshObservation, LoopAssimilation};
use crate::compute::engine::ReachExecutor;
use crate::compute::forcing::{LoopForcing, LoopInputs};
use crate::compute::kernel::{MuskingumKernel, RoutingKernel};
use crate::compute::ledger::ResultTable;
use crate::compute::scheduler::{NetworkOutcome, NetworkSchedule};
use crate::config::RoutingConfig;
use crate::context::{FaultRecord, LoopSummary, RunContext};
use crate::error::RoutingError;
use crate::graph::Network;
use crate::store::{SegmentId, SegmentRegistry, SegmentState};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// Results of one simulation loop.
#[derive(Debug)]
pub struct LoopOutput {
    pub results: ResultTable,
    /// Seed for the next loop's `LoopInputs::initial`.
    pub next_initial: BTreeMap<SegmentId, SegmentState>,
    pub summary: LoopSummary,
    pub faults: Vec<FaultRecord>,
    /// Tailwaters of the networks that emitted no results.
    pub aborted: Vec<SegmentId>,
}

pub struct RoutingModel<K: RoutingKernel = MuskingumKernel> {
    config: RoutingConfig,
    registry: SegmentRegistry,
    network: Network,
    schedules: Vec<NetworkSchedule>,
    report: TopologyReport,
    kernel: K,
    pool: rayon::ThreadPool,
}

impl RoutingModel<MuskingumKernel> {
    pub fn new(
        rows: impl IntoIterator<Item = (SegmentId, i64)>,
        registry: SegmentRegistry,
        config: RoutingConfig,
    ) -> Result<Self, RoutingError> {
        Self::with_kernel(rows, registry, config, MuskingumKernel::default())
    }
}

impl<K: RoutingKernel> RoutingModel<K> {
    /// Builds and validates the full execution plan. Every structural error
    /// surfaces here, before any loop runs.
    pub fn with_kernel(
        rows: impl IntoIterator<Item = (SegmentId, i64)>,
        mut registry: SegmentRegistry,
        config: RoutingConfig,
        kernel: K,
    ) -> Result<Self, RoutingError> {
        config.validate()?;
        // A deserialized registry arrives without its segment -> gauge lookup.
        registry.rebuild_lookup();

        // 1. Graph
        let network = Network::build(rows, config.network.terminal_code)?;
        let nodes = network.nodes();
        if let Some(&missing) = nodes.iter().find(|s| !registry.contains(**s)) {
            return Err(RoutingError::MissingParameters(missing));
        }
        for (gauge, &segment) in registry.gauge_crosswalk() {
            if !nodes.contains(&segment) {
                return Err(RoutingError::UnknownSegment { segment, context: format!("gauge '{}'", gauge) });
            }
        }
        if let Some(&segment) = registry.reservoir_crosswalk().keys().find(|s| !nodes.contains(*s)) {
            return Err(RoutingError::UnknownSegment { segment, context: "reservoir crosswalk".into() });
        }

        // 2. Plan
        let reverse = network.reverse();
        let schedules = independent_networks(&reverse, config.network.check_disjoint)?
            .iter()
            .map(NetworkSchedule::plan)
            .collect::<Result<Vec<_>, _>>()?;

        let report = TopologyReport::analyze(&network, &schedules);
        log::info!(
            "Routing plan: {} segments, {} networks, {} reaches (longest {}), widest level {}, deepest schedule {}",
            report.segments,
            report.independent_networks,
            report.reach_stats.reaches,
            report.reach_stats.longest,
            report.widest_level,
            report.deepest_schedule
        );

        // 3. Workers
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .map_err(|e| RoutingError::InvalidConfig(format!("thread pool: {}", e)))?;

        Ok(Self { config, registry, network, schedules, report, kernel, pool })
    }

    pub fn config(&self) -> &RoutingConfig { &self.config }
    pub fn registry(&self) -> &SegmentRegistry { &self.registry }
    pub fn network(&self) -> &Network { &self.network }
    pub fn schedules(&self) -> &[NetworkSchedule] { &self.schedules }
    pub fn report(&self) -> &TopologyReport { &self.report }

    /// Runs one loop of `config.nts` timesteps and rolls `state` forward.
    ///
    /// `state` is left untouched when an error is returned.
    pub fn run_loop(&self, inputs: &LoopInputs, state: &mut AssimilationState) -> Result<LoopOutput, RoutingError> {
        state.validate(&self.registry)?;
        inputs.validate(&self.registry, self.config.nts)?;

        let ctx = RunContext::new();
        let outcomes: Vec<Result<NetworkOutcome, RoutingError>> = {
            let forcing = LoopForcing { inputs, state: &*state };
            let executor = ReachExecutor::new(&self.kernel, &self.registry, &self.config, &ctx);
            let nts = self.config.nts;
            self.pool.install(|| {
                self.schedules
                    .par_iter()
                    .map(|schedule| schedule.run(&executor, &forcing, nts))
                    .collect()
            })
        };

        // Merge on the coordinating thread only.
        let elapsed = self.config.loop_seconds();
        let mut results = ResultTable::new(self.config.dt, self.config.nts);
        let mut next_initial = BTreeMap::new();
        let mut assimilation = LoopAssimilation::default();
        let mut aborted = Vec::new();

        for (schedule, outcome) in self.schedules.iter().zip(outcomes) {
            match outcome {
                Ok(out) => {
                    results.extend(out.series);
                    next_initial.extend(out.final_states);
                    assimilation.fresh.extend(out.gauge_updates);
                    assimilation.reservoirs.extend(out.persistence);
                }
                Err(err) if err.is_numeric() => {
                    log::error!("Network draining to {} aborted: {}", schedule.tailwater, err);
                    aborted.push(schedule.tailwater);
                    self.roll_back(schedule, inputs, state, elapsed, &mut next_initial, &mut assimilation);
                }
                Err(err) => return Err(err),
            }
        }

        state.update(&assimilation, elapsed)?;
        state.reservoir_persistence_update(assimilation.reservoirs);

        let mut summary = ctx.summary();
        summary.aborted_networks = aborted.len();
        log::info!(
            "Loop done: {} kernel calls, {} numeric faults, {} data gaps, {} nudged, {} persisted, {} aborted",
            summary.kernel_calls,
            summary.numeric_faults,
            summary.data_gaps,
            summary.nudged_steps,
            summary.persisted_steps,
            summary.aborted_networks
        );

        Ok(LoopOutput { results, next_initial, summary, faults: ctx.take_faults(), aborted })
    }

    /// An aborted network restarts the next loop from this loop's start state;
    /// its reservoirs keep their records, moved to the next loop's origin.
    /// Observations at its gauges still count as fresh.
    fn roll_back(
        &self,
        schedule: &NetworkSchedule,
        inputs: &LoopInputs,
        state: &AssimilationState,
        elapsed: f64,
        next_initial: &mut BTreeMap<SegmentId, SegmentState>,
        assimilation: &mut LoopAssimilation,
    ) {
        for reach in schedule.arena.iter() {
            for &segment in &reach.segments {
                next_initial.insert(segment, inputs.initial_state(segment));
                if let Some(gauge) = self.registry.gauge_at(segment) {
                    if let Some((t, discharge)) = inputs.observations.latest(gauge, self.config.nts) {
                        let observed_at = (t + 1) as f64 * self.config.dt;
                        assimilation.fresh.insert(gauge.clone(), FreshObservation { discharge, observed_at });
                    }
                }
                if let Some(record) = state.persistence.get(&segment) {
                    let mut record = *record;
                    record.rebase(elapsed);
                    assimilation.reservoirs.insert(segment, record);
                }
            }
        }
    }
}

use super::forcing::LoopForcing;
use super::kernel::{KernelInput, KernelOutput, RoutingKernel};
use super::ledger::SegmentSeries;
use crate::assimilation::{FreshObservation, GaugeNudge, Nudge, PersistenceRecord, Release};
use crate::config::{FaultPolicy, RoutingConfig};
use crate::context::{FaultRecord, RunContext};
use crate::error::RoutingError;
use crate::graph::Reach;
use crate::store::{ChannelParams, GaugeId, ReachId, SegmentId, SegmentRegistry, SegmentState};
use std::collections::BTreeMap;

/// Everything one reach produced during a loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachOutcome {
    pub reach: ReachId,
    pub series: BTreeMap<SegmentId, SegmentSeries>,
    /// Outflow of the reach's outlet segment, per timestep.
    pub outlet_flow: Vec<f64>,
    /// End-of-loop state, the next loop's start state.
    pub final_states: BTreeMap<SegmentId, SegmentState>,
    pub gauge_updates: BTreeMap<GaugeId, FreshObservation>,
    /// Rebased to the next loop's origin.
    pub persistence: BTreeMap<SegmentId, PersistenceRecord>,
}

/// Marching state of one segment.
#[derive(Clone, Copy)]
struct Cell<'a> {
    id: SegmentId,
    params: &'a ChannelParams,
    qu: f64,
    qd: f64,
    h: f64,
}

/// Drives the kernel across one reach for every timestep of a loop.
pub struct ReachExecutor<'a, K: RoutingKernel> {
    kernel: &'a K,
    registry: &'a SegmentRegistry,
    config: &'a RoutingConfig,
    ctx: &'a RunContext,
}

impl<'a, K: RoutingKernel> ReachExecutor<'a, K> {
    pub fn new(kernel: &'a K, registry: &'a SegmentRegistry, config: &'a RoutingConfig, ctx: &'a RunContext) -> Self {
        Self { kernel, registry, config, ctx }
    }

    /// Routes `reach` for one loop.
    ///
    /// `upstream_inflow[t]` is the summed outlet flow of every reach draining
    /// into this one (zeros for a headwater reach).
    pub fn run(&self, reach: &Reach, upstream_inflow: &[f64], forcing: &LoopForcing) -> Result<ReachOutcome, RoutingError> {
        let mut calls = 0;
        let result = self.march(reach, upstream_inflow, forcing, &mut calls);
        self.ctx.record_kernel_calls(calls);
        result
    }

    fn march(
        &self,
        reach: &Reach,
        upstream_inflow: &[f64],
        forcing: &LoopForcing,
        calls: &mut u64,
    ) -> Result<ReachOutcome, RoutingError> {
        let nts = self.config.nts;
        let dt = self.config.dt;
        let inputs = forcing.inputs;

        // 1. Setup
        let mut cells = Vec::with_capacity(reach.len());
        for &id in &reach.segments {
            let params = self.registry.params(id).ok_or(RoutingError::MissingParameters(id))?;
            let s = inputs.initial_state(id);
            cells.push(Cell { id, params, qu: s.qu0, qd: s.qd0, h: s.h0 });
        }

        let mut series: Vec<SegmentSeries> = (0..cells.len())
            .map(|_| SegmentSeries::with_capacity(nts, self.config.return_courant))
            .collect();

        let mut gauges: Vec<Option<(GaugeId, GaugeNudge)>> = cells
            .iter()
            .map(|c| {
                self.registry
                    .gauge_at(c.id)
                    .map(|g| (g.clone(), GaugeNudge::new(forcing.state.lastobs_of(g))))
            })
            .collect();

        let mut reservoirs: Vec<Option<(GaugeId, PersistenceRecord)>> = cells
            .iter()
            .map(|c| {
                self.registry.reservoir_gauge(c.id).map(|g| {
                    let record = forcing.state.persistence.get(&c.id).copied().unwrap_or_default();
                    (g.clone(), record)
                })
            })
            .collect();

        let head_qu = cells.first().map(|c| c.qu).unwrap_or(0.0);
        let mut outlet_flow = Vec::with_capacity(nts);

        // 2. March: timesteps outer, segments upstream -> downstream inner
        for t in 0..nts {
            let now = (t + 1) as f64 * dt;
            let mut qup = if t == 0 { head_qu } else { upstream_inflow.get(t - 1).copied().unwrap_or(0.0) };
            let mut quc = upstream_inflow.get(t).copied().unwrap_or(0.0);

            for (i, cell) in cells.iter_mut().enumerate() {
                let input = KernelInput {
                    qup,
                    quc,
                    qdp: cell.qd,
                    ql: inputs.lateral.at(cell.id, t),
                    dt,
                    depth_p: cell.h,
                    params: *cell.params,
                };
                *calls += 1;
                let out = self.solve(cell.id, t, &input)?;

                let mut flow = out.qdc;
                if let Some((gauge, record)) = reservoirs[i].as_mut() {
                    flow = self.release(record, now, inputs.observations.at(gauge, t), flow);
                }
                if let Some((gauge, nudge)) = gauges[i].as_mut() {
                    flow = self.nudge(nudge, now, inputs.observations.at(gauge, t), flow);
                }

                series[i].push(flow, &out);

                let previous = cell.qd;
                cell.qu = quc;
                cell.qd = flow;
                cell.h = out.depthc;

                qup = previous;
                quc = flow;
            }
            outlet_flow.push(quc);
        }

        // 3. Collect
        let elapsed = self.config.loop_seconds();
        let final_states = cells
            .iter()
            .map(|c| (c.id, SegmentState { qu0: c.qu, qd0: c.qd, h0: c.h }))
            .collect();
        let gauge_updates = gauges
            .into_iter()
            .flatten()
            .filter_map(|(g, nudge)| nudge.latest().map(|obs| (g, obs)))
            .collect();
        let persistence = cells
            .iter()
            .zip(reservoirs)
            .filter_map(|(c, r)| r.map(|(_, mut record)| {
                record.rebase(elapsed);
                (c.id, record)
            }))
            .collect();

        Ok(ReachOutcome {
            reach: reach.id,
            series: reach.segments.iter().copied().zip(series).collect(),
            outlet_flow,
            final_states,
            gauge_updates,
            persistence,
        })
    }

    /// One kernel call under the configured fault policy.
    fn solve(&self, segment: SegmentId, timestep: usize, input: &KernelInput) -> Result<KernelOutput, RoutingError> {
        match self.kernel.step(input) {
            Ok(out) => Ok(out),
            Err(fault) => match self.config.fault_policy {
                FaultPolicy::AbortReach => {
                    log::error!(
                        "Kernel fault at segment {} timestep {}: {} (qup={}, quc={}, qdp={}, ql={}, depth_p={}); aborting network",
                        segment, timestep, fault, input.qup, input.quc, input.qdp, input.ql, input.depth_p
                    );
                    self.ctx.record_fault(FaultRecord { segment, timestep, fault: fault.clone(), input: *input });
                    Err(RoutingError::NumericFault { segment, timestep, fault })
                }
                FaultPolicy::Fallback => {
                    log::warn!(
                        "Kernel fault at segment {} timestep {}: {} (qup={}, quc={}, qdp={}, ql={}, depth_p={}); passing flow through",
                        segment, timestep, fault, input.qup, input.quc, input.qdp, input.ql, input.depth_p
                    );
                    self.ctx.record_fault(FaultRecord { segment, timestep, fault, input: *input });
                    Ok(KernelOutput {
                        qdc: (input.quc + input.ql).max(0.0),
                        velc: 0.0,
                        depthc: input.depth_p,
                        ..Default::default()
                    })
                }
            },
        }
    }

    fn release(&self, record: &mut PersistenceRecord, now: f64, observation: Option<f64>, routed: f64) -> f64 {
        let cfg = &self.config.persistence;
        if !cfg.enabled {
            return routed;
        }
        let release = record.step(now, observation, routed, cfg);
        if !matches!(release, Release::Routed(_)) {
            self.ctx.record_persistence();
        }
        release.flow()
    }

    fn nudge(&self, nudge: &mut GaugeNudge, now: f64, observation: Option<f64>, routed: f64) -> f64 {
        let cfg = &self.config.nudging;
        if observation.is_none() {
            self.ctx.record_data_gap();
            log::debug!("No valid observation at t={}s; gauge left to the carried value", now);
        }
        let outcome = nudge.apply(now, observation, routed, cfg.decay_seconds, cfg.enabled);
        if !matches!(outcome, Nudge::Gap(_)) {
            self.ctx.record_nudge();
        }
        outcome.flow()
    }
}

//! Loop-scoped counters and the numeric fault sink.
//!
//! One `RunContext` is created per simulation loop and handed by reference to
//! every reach worker; nothing here is global.

use crate::compute::kernel::{KernelFault, KernelInput};
use crate::store::SegmentId;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One kernel failure, with the inputs that triggered it.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRecord {
    pub segment: SegmentId,
    pub timestep: usize,
    pub fault: KernelFault,
    pub input: KernelInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopSummary {
    pub kernel_calls: u64,
    pub numeric_faults: u64,
    pub data_gaps: u64,
    pub nudged_steps: u64,
    pub persisted_steps: u64,
    pub aborted_networks: usize,
}

#[derive(Debug, Default)]
pub struct RunContext {
    kernel_calls: AtomicU64,
    numeric_faults: AtomicU64,
    data_gaps: AtomicU64,
    nudged_steps: AtomicU64,
    persisted_steps: AtomicU64,
    faults: Mutex<Vec<FaultRecord>>,
}

impl RunContext {
    pub fn new() -> Self { Self::default() }

    pub fn record_kernel_calls(&self, n: u64) {
        self.kernel_calls.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_fault(&self, record: FaultRecord) {
        self.numeric_faults.fetch_add(1, Ordering::Relaxed);
        // A poisoned sink still holds every record pushed before the panic.
        match self.faults.lock() {
            Ok(mut sink) => sink.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }

    pub fn record_data_gap(&self) {
        self.data_gaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_nudge(&self) {
        self.nudged_steps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistence(&self) {
        self.persisted_steps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> LoopSummary {
        LoopSummary {
            kernel_calls: self.kernel_calls.load(Ordering::Relaxed),
            numeric_faults: self.numeric_faults.load(Ordering::Relaxed),
            data_gaps: self.data_gaps.load(Ordering::Relaxed),
            nudged_steps: self.nudged_steps.load(Ordering::Relaxed),
            persisted_steps: self.persisted_steps.load(Ordering::Relaxed),
            aborted_networks: 0,
        }
    }

    /// Drains the fault sink, ordered by segment then timestep.
    pub fn take_faults(&self) -> Vec<FaultRecord> {
        let mut faults = match self.faults.lock() {
            Ok(mut sink) => std::mem::take(&mut *sink),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        faults.sort_by_key(|f| (f.segment, f.timestep));
        faults
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChannelParams;
    use rayon::prelude::*;

    #[test]
    fn test_counters_are_shared_across_workers() {
        let ctx = RunContext::new();
        (0..100).into_par_iter().for_each(|_| {
            ctx.record_kernel_calls(3);
            ctx.record_data_gap();
        });
        let summary = ctx.summary();
        assert_eq!(summary.kernel_calls, 300);
        assert_eq!(summary.data_gaps, 100);
        assert_eq!(summary.numeric_faults, 0);
    }

    #[test]
    fn test_faults_are_drained_in_segment_order() {
        let ctx = RunContext::new();
        let input = KernelInput {
            qup: 0.0, quc: 0.0, qdp: 0.0, ql: 0.0, dt: 60.0, depth_p: 0.0,
            params: ChannelParams::default(),
        };
        for (seg, ts) in [(5, 1), (2, 3), (5, 0)] {
            ctx.record_fault(FaultRecord {
                segment: SegmentId(seg),
                timestep: ts,
                fault: KernelFault::NonConvergence { iterations: 1 },
                input,
            });
        }
        let faults = ctx.take_faults();
        let keys: Vec<_> = faults.iter().map(|f| (f.segment.0, f.timestep)).collect();
        assert_eq!(keys, vec![(2, 3), (5, 0), (5, 1)]);
        assert_eq!(ctx.summary().numeric_faults, 3);
        assert!(ctx.take_faults().is_empty());
    }
}

//! Error taxonomy of the routing core.
//!
//! Structural and configuration errors are fatal and propagate to the caller.
//! Numeric faults only surface here when the fault policy is `AbortReach`;
//! data gaps never do.

use crate::compute::kernel::KernelFault;
use crate::store::{GaugeId, ReachId, SegmentId};
use thiserror::Error;

/// The drainage graph cannot be scheduled as given.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructuralError {
    #[error("Cycle detected in reach dependency graph: {unprocessed} of {total} reaches never became ready")]
    CyclicDependency { unprocessed: usize, total: usize },
    #[error("Segment {segment} drains to both tailwater {first} and tailwater {second}")]
    SharedUpstream { segment: SegmentId, first: SegmentId, second: SegmentId },
    #[error("{count} segment(s) drain to no tailwater (first: {first}); the network contains a cycle")]
    Unrooted { count: usize, first: SegmentId },
    #[error("Segment {0} drains into itself")]
    SelfLoop(SegmentId),
    #[error("Segment {0} was reached twice while decomposing reaches")]
    RevisitedSegment(SegmentId),
    #[error("{0} was scheduled before one of its upstream reaches published its outflow")]
    UnpublishedUpstream(ReachId),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),
    #[error("Segment {0} appears more than once in the topology rows")]
    DuplicateSegment(SegmentId),
    #[error("Unknown segment {segment} referenced by {context}")]
    UnknownSegment { segment: SegmentId, context: String },
    #[error("Unknown gauge '{gauge}' referenced by {context}")]
    UnknownGauge { gauge: GaugeId, context: String },
    #[error("Assimilation state has no entry for {0}; carried state was lost")]
    MissingAssimilationEntry(String),
    #[error("No channel parameters for segment {0}")]
    MissingParameters(SegmentId),
    #[error("Lateral inflow for segment {segment} has {actual} timesteps, the loop needs {expected}")]
    ForcingLength { segment: SegmentId, expected: usize, actual: usize },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Numeric fault at segment {segment}, timestep {timestep}: {fault}")]
    NumericFault { segment: SegmentId, timestep: usize, fault: KernelFault },
}

impl RoutingError {
    pub fn is_structural(&self) -> bool {
        matches!(self, RoutingError::Structural(_))
    }

    /// Configuration errors abort the whole run.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RoutingError::DuplicateSegment(_)
                | RoutingError::UnknownSegment { .. }
                | RoutingError::UnknownGauge { .. }
                | RoutingError::MissingAssimilationEntry(_)
                | RoutingError::MissingParameters(_)
                | RoutingError::ForcingLength { .. }
                | RoutingError::InvalidConfig(_)
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, RoutingError::NumericFault { .. })
    }
}

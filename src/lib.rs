// Library root: river network decomposition, dependency-ordered reach
// marching and the assimilation state carried between simulation loops.
//
// Typical use: build a `RoutingModel` once from topology rows, channel
// parameters and a `RoutingConfig`, seed an `AssimilationState`, then call
// `run_loop` once per simulation loop, feeding `LoopOutput::next_initial`
// back into the next loop's inputs.

pub mod analysis;
pub mod assimilation;
pub mod compute;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod model;
pub mod store;

pub use assimilation::{AssimilationSnapshot, AssimilationState};
pub use compute::{LateralInflows, LoopInputs, MuskingumKernel, Observations, ResultTable, RoutingKernel};
pub use config::{FaultPolicy, RoutingConfig};
pub use context::{LoopSummary, RunContext};
pub use error::{RoutingError, StructuralError};
pub use graph::Network;
pub use model::{LoopOutput, RoutingModel};
pub use store::{ChannelParams, GaugeId, SegmentId, SegmentRegistry, SegmentState};

//! Reach marching: the kernel contract, the executor and the per-network scheduler.
pub mod engine;
pub mod forcing;
pub mod kernel;
pub mod ledger;
pub mod scheduler;

pub use engine::{ReachExecutor, ReachOutcome};
pub use forcing::{LateralInflows, LoopForcing, LoopInputs, Observations};
pub use kernel::{KernelFault, KernelInput, KernelOutput, MuskingumKernel, RoutingKernel};
pub use ledger::{CourantDiagnostics, ResultTable, SegmentSeries};
pub use scheduler::{NetworkOutcome, NetworkSchedule};

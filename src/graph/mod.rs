//! Drainage graph model, reach decomposition and reach dependency scheduling.
pub mod dag;
pub mod decompose;
pub mod network;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenient access
pub use dag::ReachDependencyGraph;
pub use decompose::{decompose, decompose_basin, Reach, ReachArena};
pub use network::{Adjacency, Network};

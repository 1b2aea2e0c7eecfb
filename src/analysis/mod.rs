pub mod telemetry;
pub mod topology;

pub use telemetry::{ReachStats, TopologyReport};
pub use topology::{headwaters, independent_networks, junctions, tailwaters, IndependentNetwork};

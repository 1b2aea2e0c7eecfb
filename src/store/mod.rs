//! Segment identifiers, static hydraulic parameters and observation crosswalks.
pub mod registry;
pub mod types;

pub use registry::SegmentRegistry;
pub use types::{ChannelParams, GaugeId, ReachId, SegmentId, SegmentState, TerminalCode};

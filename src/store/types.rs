use serde::{Serialize, Deserialize};
use std::fmt;

/// Identifier of a routing segment, as carried by the external topology source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub i64);

impl SegmentId {
    #[inline(always)]
    pub fn value(&self) -> i64 { self.0 }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SegmentId {
    fn from(v: i64) -> Self { Self(v) }
}

/// Index of a reach inside one independent network's reach arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ReachId(pub u32);

impl ReachId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

impl fmt::Display for ReachId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reach#{}", self.0)
    }
}

/// Gauge (observation site) identifier, e.g. a USGS station code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GaugeId(pub String);

impl fmt::Display for GaugeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GaugeId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

/// Downstream code meaning "no downstream segment".
///
/// Negative downstream ids are always treated as terminal as well: the
/// topology sources use them to flag targets outside the network's own index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerminalCode(pub i64);

impl TerminalCode {
    #[inline(always)]
    pub fn is_terminal(&self, downstream: i64) -> bool {
        downstream == self.0 || downstream < 0
    }
}

/// Static hydraulic parameters of a segment.
///
/// The graph layers never look inside; only the numeric kernel does.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelParams {
    /// Channel length (m).
    pub dx: f64,
    /// Manning's roughness of the main channel.
    pub n: f64,
    /// Manning's roughness of the compound (floodplain) channel.
    pub ncc: f64,
    /// Bottom slope (m/m).
    pub s0: f64,
    /// Bottom width (m).
    pub bw: f64,
    /// Top width at bankfull (m).
    pub tw: f64,
    /// Top width of the compound channel (m).
    pub twcc: f64,
    /// Channel side slope (horizontal run per unit rise, inverted by the kernel).
    pub cs: f64,
}

impl Default for ChannelParams {
    /// A generic mid-sized trapezoidal channel.
    fn default() -> Self {
        Self {
            dx: 1000.0,
            n: 0.035,
            ncc: 0.07,
            s0: 0.001,
            bw: 10.0,
            tw: 15.0,
            twcc: 40.0,
            cs: 0.5,
        }
    }
}

/// Start-of-loop state of one segment (`qu0`, `qd0`, `h0`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentState {
    /// Upstream inflow (m^3/s).
    pub qu0: f64,
    /// Downstream outflow (m^3/s).
    pub qd0: f64,
    /// Flow depth (m).
    pub h0: f64,
}

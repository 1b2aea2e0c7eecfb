use crate::store::SegmentId;
use serde::{Serialize, Deserialize};

/// Last valid observation carried for one nudging gauge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastObs {
    pub segment: SegmentId,
    /// Seconds between the last valid observation and the end of the most
    /// recent loop (the start of the next one). Never negative.
    pub time_since_lastobs: f64,
    /// `None` until the gauge has reported once.
    pub discharge: Option<f64>,
}

impl LastObs {
    pub fn never_observed(segment: SegmentId) -> Self {
        Self { segment, time_since_lastobs: 0.0, discharge: None }
    }

    /// Age of the carried observation `seconds` into the current loop.
    #[inline(always)]
    pub fn age_at(&self, seconds: f64) -> f64 {
        self.time_since_lastobs + seconds
    }

    /// Rolls the entry across a loop of `elapsed` seconds.
    pub fn advance(&mut self, fresh: Option<&FreshObservation>, elapsed: f64) {
        match fresh {
            Some(obs) => {
                self.time_since_lastobs = (elapsed - obs.observed_at).max(0.0);
                self.discharge = Some(obs.discharge);
            }
            None => self.time_since_lastobs += elapsed,
        }
    }
}

/// The latest valid observation a gauge produced during a loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreshObservation {
    pub discharge: f64,
    /// Seconds from the loop start.
    pub observed_at: f64,
}

/// Entry of an externally supplied last-observation snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedValue {
    pub time_since_lastobs: f64,
    pub discharge: f64,
}

//! Streamflow nudging at gauge segments.

use super::lastobs::{FreshObservation, LastObs};

/// How a gauge segment's flow was set for one timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Nudge {
    /// A valid observation replaced the flow.
    Observed(f64),
    /// The last valid observation was blended into the routed flow.
    Blended { flow: f64, weight: f64 },
    /// No observation ever seen; the routed flow stands.
    Gap(f64),
}

impl Nudge {
    pub fn flow(&self) -> f64 {
        match *self {
            Nudge::Observed(q) | Nudge::Gap(q) => q,
            Nudge::Blended { flow, .. } => flow,
        }
    }
}

/// Loop-local nudging state of one gauge.
#[derive(Debug, Clone)]
pub struct GaugeNudge<'a> {
    carried: Option<&'a LastObs>,
    latest: Option<FreshObservation>,
}

impl<'a> GaugeNudge<'a> {
    pub fn new(carried: Option<&'a LastObs>) -> Self {
        Self { carried, latest: None }
    }

    /// Applies the gauge at `now` seconds into the loop.
    ///
    /// With nudging disabled the observation is still recorded, but the routed
    /// flow is returned untouched.
    pub fn apply(&mut self, now: f64, observation: Option<f64>, routed: f64, decay_seconds: f64, enabled: bool) -> Nudge {
        if let Some(q) = observation {
            self.latest = Some(FreshObservation { discharge: q, observed_at: now });
            return if enabled { Nudge::Observed(q) } else { Nudge::Gap(routed) };
        }
        if !enabled {
            return Nudge::Gap(routed);
        }

        let last = match (&self.latest, self.carried) {
            (Some(fresh), _) => Some((fresh.discharge, now - fresh.observed_at)),
            (None, Some(obs)) => obs.discharge.map(|q| (q, obs.age_at(now))),
            (None, None) => None,
        };
        match last {
            Some((q, age)) => {
                let weight = (-age.max(0.0) / decay_seconds).exp();
                Nudge::Blended { flow: weight * q + (1.0 - weight) * routed, weight }
            }
            None => Nudge::Gap(routed),
        }
    }

    /// The last valid observation seen this loop.
    pub fn latest(&self) -> Option<FreshObservation> {
        self.latest
    }
}

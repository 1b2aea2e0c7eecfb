//! Data-assimilation state threaded from one simulation loop to the next.
//!
//! The state is seeded once from an external snapshot, validated before every
//! loop, and rewritten after every loop from that loop's results. A missing
//! entry is an error, never silently defaulted.

pub mod lastobs;
pub mod nudging;
pub mod persistence;

pub use lastobs::{FreshObservation, LastObs, ObservedValue};
pub use nudging::{GaugeNudge, Nudge};
pub use persistence::{PersistenceRecord, Release};

use crate::error::RoutingError;
use crate::store::{GaugeId, SegmentId, SegmentRegistry};
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// Externally supplied cold-start content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssimilationSnapshot {
    pub lastobs: BTreeMap<GaugeId, ObservedValue>,
    pub persistence: BTreeMap<SegmentId, PersistenceRecord>,
}

/// What one loop produced for the carrier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopAssimilation {
    /// Latest valid observation per gauge that reported during the loop.
    pub fresh: BTreeMap<GaugeId, FreshObservation>,
    /// Persistence records, already rebased to the next loop's origin.
    pub reservoirs: BTreeMap<SegmentId, PersistenceRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssimilationState {
    pub lastobs: BTreeMap<GaugeId, LastObs>,
    pub persistence: BTreeMap<SegmentId, PersistenceRecord>,
}

impl AssimilationState {
    /// Builds the carried state for every gauge and reservoir of the registry.
    pub fn seed(snapshot: &AssimilationSnapshot, registry: &SegmentRegistry) -> Result<Self, RoutingError> {
        let crosswalk = registry.gauge_crosswalk();

        if let Some(gauge) = snapshot.lastobs.keys().find(|g| !crosswalk.contains_key(*g)) {
            return Err(RoutingError::UnknownGauge { gauge: gauge.clone(), context: "last-observation snapshot".into() });
        }
        if let Some(&segment) = snapshot.persistence.keys().find(|s| registry.reservoir_gauge(**s).is_none()) {
            return Err(RoutingError::UnknownSegment { segment, context: "persistence snapshot".into() });
        }

        let mut lastobs = BTreeMap::new();
        for (gauge, &segment) in crosswalk {
            if !registry.contains(segment) {
                return Err(RoutingError::UnknownSegment { segment, context: format!("gauge '{}'", gauge) });
            }
            let entry = match snapshot.lastobs.get(gauge) {
                Some(v) => LastObs {
                    segment,
                    time_since_lastobs: v.time_since_lastobs,
                    discharge: Some(v.discharge),
                },
                None => LastObs::never_observed(segment),
            };
            lastobs.insert(gauge.clone(), entry);
        }

        let persistence = registry
            .reservoir_crosswalk()
            .keys()
            .map(|&seg| (seg, snapshot.persistence.get(&seg).copied().unwrap_or_default()))
            .collect();

        Ok(Self { lastobs, persistence })
    }

    /// Rejects state that lost an entry the registry still expects.
    pub fn validate(&self, registry: &SegmentRegistry) -> Result<(), RoutingError> {
        for (gauge, &segment) in registry.gauge_crosswalk() {
            match self.lastobs.get(gauge) {
                None => return Err(RoutingError::MissingAssimilationEntry(format!("gauge '{}'", gauge))),
                Some(obs) if obs.segment != segment => {
                    return Err(RoutingError::InvalidConfig(format!(
                        "carried gauge '{}' sits on segment {}, crosswalk says {}",
                        gauge, obs.segment, segment
                    )))
                }
                Some(_) => {}
            }
        }
        if let Some(seg) = registry.reservoir_crosswalk().keys().find(|s| !self.persistence.contains_key(*s)) {
            return Err(RoutingError::MissingAssimilationEntry(format!("reservoir {}", seg)));
        }
        Ok(())
    }

    /// Rolls every last observation across a loop of `elapsed` seconds.
    pub fn update(&mut self, results: &LoopAssimilation, elapsed: f64) -> Result<(), RoutingError> {
        if let Some(gauge) = results.fresh.keys().find(|g| !self.lastobs.contains_key(*g)) {
            return Err(RoutingError::UnknownGauge { gauge: gauge.clone(), context: "loop results".into() });
        }
        for (gauge, obs) in self.lastobs.iter_mut() {
            obs.advance(results.fresh.get(gauge), elapsed);
        }
        Ok(())
    }

    /// Replaces the persistence table wholesale.
    pub fn reservoir_persistence_update(&mut self, records: BTreeMap<SegmentId, PersistenceRecord>) {
        self.persistence = records;
    }

    pub fn lastobs_of(&self, gauge: &GaugeId) -> Option<&LastObs> {
        self.lastobs.get(gauge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChannelParams;

    fn registry() -> SegmentRegistry {
        let mut reg = SegmentRegistry::from_params((1..=4).map(|i| (SegmentId(i), ChannelParams::default())));
        reg.add_gauge("G1".into(), SegmentId(1)).unwrap();
        reg.add_gauge("G2".into(), SegmentId(2)).unwrap();
        reg.add_persistence_reservoir(SegmentId(4), "R4".into()).unwrap();
        reg
    }

    fn snapshot() -> AssimilationSnapshot {
        let mut snap = AssimilationSnapshot::default();
        snap.lastobs.insert("G1".into(), ObservedValue { time_since_lastobs: 0.0, discharge: 5.0 });
        snap
    }

    #[test]
    fn test_seed_covers_every_crosswalk_entry() {
        let state = AssimilationState::seed(&snapshot(), &registry()).unwrap();
        assert_eq!(state.lastobs.len(), 2);
        assert_eq!(state.lastobs_of(&"G1".into()).unwrap().discharge, Some(5.0));
        assert_eq!(state.lastobs_of(&"G2".into()).unwrap().discharge, None);
        assert_eq!(state.persistence.get(&SegmentId(4)), Some(&PersistenceRecord::default()));
        assert!(state.validate(&registry()).is_ok());
    }

    #[test]
    fn test_seed_rejects_unknown_gauge() {
        let mut snap = snapshot();
        snap.lastobs.insert("ghost".into(), ObservedValue { time_since_lastobs: 0.0, discharge: 1.0 });
        let err = AssimilationState::seed(&snap, &registry()).unwrap_err();
        assert!(matches!(err, RoutingError::UnknownGauge { .. }));
    }

    #[test]
    fn test_stale_gauge_ages_across_an_hour_loop() {
        let mut state = AssimilationState::seed(&snapshot(), &registry()).unwrap();
        state.update(&LoopAssimilation::default(), 3600.0).unwrap();
        assert_eq!(state.lastobs_of(&"G1".into()).unwrap().time_since_lastobs, 3600.0);
    }

    #[test]
    fn test_update_applies_fresh_observations() {
        let mut state = AssimilationState::seed(&snapshot(), &registry()).unwrap();
        let mut results = LoopAssimilation::default();
        results.fresh.insert("G2".into(), FreshObservation { discharge: 9.0, observed_at: 3300.0 });
        state.update(&results, 3600.0).unwrap();

        let g2 = state.lastobs_of(&"G2".into()).unwrap();
        assert_eq!(g2.time_since_lastobs, 300.0);
        assert_eq!(g2.discharge, Some(9.0));
    }

    #[test]
    fn test_update_rejects_unknown_gauge_without_mutating() {
        let mut state = AssimilationState::seed(&snapshot(), &registry()).unwrap();
        let before = state.clone();
        let mut results = LoopAssimilation::default();
        results.fresh.insert("ghost".into(), FreshObservation { discharge: 1.0, observed_at: 0.0 });
        assert!(state.update(&results, 3600.0).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn test_lost_entries_are_rejected() {
        let mut state = AssimilationState::seed(&snapshot(), &registry()).unwrap();
        state.lastobs.remove(&GaugeId::from("G2"));
        assert_eq!(
            state.validate(&registry()).unwrap_err(),
            RoutingError::MissingAssimilationEntry("gauge 'G2'".into())
        );

        let mut state = AssimilationState::seed(&snapshot(), &registry()).unwrap();
        state.reservoir_persistence_update(BTreeMap::new());
        assert!(state.validate(&registry()).unwrap_err().is_configuration());
    }

    #[test]
    fn test_state_survives_serde_round_trip() {
        let state = AssimilationState::seed(&snapshot(), &registry()).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let loaded: AssimilationState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, state);
    }
}

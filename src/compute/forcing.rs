//! Per-loop inputs handed to the executor: lateral inflows, start-of-loop
//! segment states and gauge observations.

use crate::assimilation::AssimilationState;
use crate::error::RoutingError;
use crate::store::{GaugeId, SegmentId, SegmentRegistry, SegmentState};
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// Lateral inflow series (m^3/s) per segment, one value per timestep.
///
/// Segments without a series receive no lateral inflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LateralInflows {
    series: BTreeMap<SegmentId, Vec<f64>>,
}

impl LateralInflows {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, segment: SegmentId, values: Vec<f64>) {
        self.series.insert(segment, values);
    }

    #[inline(always)]
    pub fn at(&self, segment: SegmentId, timestep: usize) -> f64 {
        self.series
            .get(&segment)
            .and_then(|s| s.get(timestep))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn len(&self) -> usize { self.series.len() }
    pub fn is_empty(&self) -> bool { self.series.is_empty() }

    pub fn validate(&self, registry: &SegmentRegistry, nts: usize) -> Result<(), RoutingError> {
        for (&segment, values) in &self.series {
            if !registry.contains(segment) {
                return Err(RoutingError::UnknownSegment { segment, context: "lateral inflows".into() });
            }
            if values.len() != nts {
                return Err(RoutingError::ForcingLength { segment, expected: nts, actual: values.len() });
            }
        }
        Ok(())
    }
}

impl FromIterator<(SegmentId, Vec<f64>)> for LateralInflows {
    fn from_iter<T: IntoIterator<Item = (SegmentId, Vec<f64>)>>(iter: T) -> Self {
        Self { series: iter.into_iter().collect() }
    }
}

/// Observed discharge (m^3/s) per gauge and timestep. `None` is a missing value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Observations {
    series: BTreeMap<GaugeId, Vec<Option<f64>>>,
}

impl Observations {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, gauge: GaugeId, values: Vec<Option<f64>>) {
        self.series.insert(gauge, values);
    }

    /// The valid observation of `gauge` at `timestep`, if any.
    ///
    /// Non-finite and negative values are quality-control rejects and count as missing.
    pub fn at(&self, gauge: &GaugeId, timestep: usize) -> Option<f64> {
        self.series
            .get(gauge)
            .and_then(|s| s.get(timestep))
            .copied()
            .flatten()
            .filter(|q| q.is_finite() && *q >= 0.0)
    }

    /// The last valid observation of `gauge` within the first `nts` timesteps.
    pub fn latest(&self, gauge: &GaugeId, nts: usize) -> Option<(usize, f64)> {
        (0..nts).rev().find_map(|t| self.at(gauge, t).map(|q| (t, q)))
    }

    pub fn gauges(&self) -> impl Iterator<Item = &GaugeId> + '_ {
        self.series.keys()
    }

    /// Every observed gauge must be known to one of the crosswalks.
    pub fn validate(&self, registry: &SegmentRegistry) -> Result<(), RoutingError> {
        for gauge in self.series.keys() {
            let nudging = registry.gauge_crosswalk().contains_key(gauge);
            let reservoir = registry.reservoir_crosswalk().values().any(|g| g == gauge);
            if !nudging && !reservoir {
                return Err(RoutingError::UnknownGauge { gauge: gauge.clone(), context: "observations".into() });
            }
        }
        Ok(())
    }
}

impl FromIterator<(GaugeId, Vec<Option<f64>>)> for Observations {
    fn from_iter<T: IntoIterator<Item = (GaugeId, Vec<Option<f64>>)>>(iter: T) -> Self {
        Self { series: iter.into_iter().collect() }
    }
}

/// Everything one simulation loop consumes besides the carried assimilation state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopInputs {
    pub lateral: LateralInflows,
    /// Start-of-loop state; missing segments cold start at zero.
    pub initial: BTreeMap<SegmentId, SegmentState>,
    pub observations: Observations,
}

impl LoopInputs {
    pub fn validate(&self, registry: &SegmentRegistry, nts: usize) -> Result<(), RoutingError> {
        self.lateral.validate(registry, nts)?;
        self.observations.validate(registry)?;
        if let Some(&segment) = self.initial.keys().find(|s| !registry.contains(**s)) {
            return Err(RoutingError::UnknownSegment { segment, context: "initial states".into() });
        }
        Ok(())
    }

    pub fn initial_state(&self, segment: SegmentId) -> SegmentState {
        self.initial.get(&segment).copied().unwrap_or_default()
    }
}

/// Read-only view shared by every reach worker of a loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopForcing<'a> {
    pub inputs: &'a LoopInputs,
    pub state: &'a AssimilationState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChannelParams;
    use rstest::rstest;

    fn registry() -> SegmentRegistry {
        let mut reg = SegmentRegistry::from_params((1..=3).map(|i| (SegmentId(i), ChannelParams::default())));
        reg.add_gauge("G2".into(), SegmentId(2)).unwrap();
        reg.add_persistence_reservoir(SegmentId(3), "R3".into()).unwrap();
        reg
    }

    #[test]
    fn test_missing_lateral_is_zero() {
        let lateral: LateralInflows = [(SegmentId(1), vec![1.0, 2.0])].into_iter().collect();
        assert_eq!(lateral.at(SegmentId(1), 1), 2.0);
        assert_eq!(lateral.at(SegmentId(1), 5), 0.0);
        assert_eq!(lateral.at(SegmentId(2), 0), 0.0);
    }

    #[rstest]
    #[case(Some(4.0), Some(4.0))]
    #[case(None, None)]
    #[case(Some(-1.0), None)]
    #[case(Some(f64::NAN), None)]
    fn test_observation_quality_control(#[case] raw: Option<f64>, #[case] expected: Option<f64>) {
        let obs: Observations = [(GaugeId::from("G2"), vec![raw])].into_iter().collect();
        assert_eq!(obs.at(&"G2".into(), 0), expected);
    }

    #[test]
    fn test_latest_skips_rejected_values() {
        let obs: Observations = [(GaugeId::from("G2"), vec![Some(3.0), None, Some(5.0), Some(-1.0), Some(9.0)])]
            .into_iter()
            .collect();
        assert_eq!(obs.latest(&"G2".into(), 4), Some((2, 5.0)));
        assert_eq!(obs.latest(&"G2".into(), 5), Some((4, 9.0)));
        assert_eq!(obs.latest(&"G2".into(), 0), None);
        assert_eq!(obs.latest(&"missing".into(), 5), None);
    }

    #[test]
    fn test_short_lateral_series_is_rejected() {
        let inputs = LoopInputs {
            lateral: [(SegmentId(1), vec![1.0; 3])].into_iter().collect(),
            ..Default::default()
        };
        let err = inputs.validate(&registry(), 4).unwrap_err();
        assert_eq!(err, RoutingError::ForcingLength { segment: SegmentId(1), expected: 4, actual: 3 });
    }

    #[test]
    fn test_observations_accept_both_crosswalks() {
        let reg = registry();
        let obs: Observations = [
            (GaugeId::from("G2"), vec![Some(1.0)]),
            (GaugeId::from("R3"), vec![None]),
        ]
        .into_iter()
        .collect();
        assert!(obs.validate(&reg).is_ok());

        let stray: Observations = [(GaugeId::from("nowhere"), vec![])].into_iter().collect();
        assert!(matches!(stray.validate(&reg), Err(RoutingError::UnknownGauge { .. })));
    }

    #[test]
    fn test_unknown_initial_state_is_rejected() {
        let mut inputs = LoopInputs::default();
        inputs.initial.insert(SegmentId(42), SegmentState::default());
        assert!(inputs.validate(&registry(), 1).unwrap_err().is_configuration());
        assert_eq!(inputs.initial_state(SegmentId(1)), SegmentState::default());
    }
}

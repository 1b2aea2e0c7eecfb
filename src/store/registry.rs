use super::types::*;
use crate::error::RoutingError;
use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;

/// Static per-segment tables: hydraulic parameters plus the observation crosswalks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentRegistry {
    params: BTreeMap<SegmentId, ChannelParams>,

    // Crosswalks
    gauges: BTreeMap<GaugeId, SegmentId>,
    reservoirs: BTreeMap<SegmentId, GaugeId>,

    // Reverse lookup for the nudging gauges (Not serialized, rebuilt on load)
    #[serde(skip)]
    gauge_by_segment: BTreeMap<SegmentId, GaugeId>,
}

impl SegmentRegistry {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.params.len() }

    /// Rebuilds the segment -> gauge lookup after deserialization.
    pub fn rebuild_lookup(&mut self) {
        self.gauge_by_segment = self
            .gauges
            .iter()
            .map(|(g, s)| (*s, g.clone()))
            .collect();
    }

    pub fn insert_params(&mut self, id: SegmentId, params: ChannelParams) {
        self.params.insert(id, params);
    }

    pub fn from_params(rows: impl IntoIterator<Item = (SegmentId, ChannelParams)>) -> Self {
        let mut reg = Self::new();
        for (id, p) in rows {
            reg.insert_params(id, p);
        }
        reg
    }

    /// Registers a nudging gauge located at `segment`.
    pub fn add_gauge(&mut self, gauge: GaugeId, segment: SegmentId) -> Result<(), RoutingError> {
        if !self.params.contains_key(&segment) {
            return Err(RoutingError::UnknownSegment { segment, context: format!("gauge '{}'", gauge) });
        }
        if let Some(existing) = self.gauge_by_segment.get(&segment) {
            if *existing != gauge {
                return Err(RoutingError::InvalidConfig(format!(
                    "segment {} already carries gauge '{}', cannot also carry '{}'",
                    segment, existing, gauge
                )));
            }
        }
        // A gauge sits on one segment; moving it drops the old reverse entry.
        if let Some(old) = self.gauges.insert(gauge.clone(), segment) {
            self.gauge_by_segment.remove(&old);
        }
        self.gauge_by_segment.insert(segment, gauge);
        Ok(())
    }

    /// Registers `segment` as a persistence reservoir fed by observations from `gauge`.
    pub fn add_persistence_reservoir(&mut self, segment: SegmentId, gauge: GaugeId) -> Result<(), RoutingError> {
        if !self.params.contains_key(&segment) {
            return Err(RoutingError::UnknownSegment { segment, context: format!("reservoir gauge '{}'", gauge) });
        }
        self.reservoirs.insert(segment, gauge);
        Ok(())
    }

    #[inline(always)]
    pub fn params(&self, id: SegmentId) -> Option<&ChannelParams> {
        self.params.get(&id)
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.params.contains_key(&id)
    }

    pub fn gauge_crosswalk(&self) -> &BTreeMap<GaugeId, SegmentId> {
        &self.gauges
    }

    pub fn reservoir_crosswalk(&self) -> &BTreeMap<SegmentId, GaugeId> {
        &self.reservoirs
    }

    pub fn gauge_at(&self, segment: SegmentId) -> Option<&GaugeId> {
        self.gauge_by_segment.get(&segment)
    }

    pub fn reservoir_gauge(&self, segment: SegmentId) -> Option<&GaugeId> {
        self.reservoirs.get(&segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SegmentRegistry {
        SegmentRegistry::from_params((1..=3).map(|i| (SegmentId(i), ChannelParams::default())))
    }

    #[test]
    fn test_gauge_on_unknown_segment_is_rejected() {
        let mut reg = registry();
        let err = reg.add_gauge("01010000".into(), SegmentId(99)).unwrap_err();
        assert!(matches!(err, RoutingError::UnknownSegment { segment: SegmentId(99), .. }));
    }

    #[test]
    fn test_lookup_survives_serde_round_trip() {
        let mut reg = registry();
        reg.add_gauge("01010000".into(), SegmentId(2)).unwrap();

        let json = serde_json::to_string(&reg).unwrap();
        let mut loaded: SegmentRegistry = serde_json::from_str(&json).unwrap();
        assert!(loaded.gauge_at(SegmentId(2)).is_none());

        loaded.rebuild_lookup();
        assert_eq!(loaded.gauge_at(SegmentId(2)), Some(&GaugeId::from("01010000")));
    }

    #[test]
    fn test_second_gauge_on_same_segment_is_rejected() {
        let mut reg = registry();
        reg.add_gauge("A".into(), SegmentId(1)).unwrap();
        assert!(reg.add_gauge("B".into(), SegmentId(1)).is_err());
        // Re-registering the same pair is harmless.
        assert!(reg.add_gauge("A".into(), SegmentId(1)).is_ok());
        assert_eq!(reg.gauge_at(SegmentId(1)), Some(&GaugeId::from("A")));
    }

    #[test]
    fn test_moving_a_gauge_clears_its_old_segment() {
        let mut reg = registry();
        reg.add_gauge("A".into(), SegmentId(1)).unwrap();
        reg.add_gauge("A".into(), SegmentId(2)).unwrap();

        assert_eq!(reg.gauge_at(SegmentId(1)), None);
        assert_eq!(reg.gauge_at(SegmentId(2)), Some(&GaugeId::from("A")));
        assert_eq!(reg.gauge_crosswalk().len(), 1);
        // The freed segment can take another gauge.
        assert!(reg.add_gauge("B".into(), SegmentId(1)).is_ok());
    }
}

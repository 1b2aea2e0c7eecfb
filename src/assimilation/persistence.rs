//! Reservoir persistence: hold the last observed release until it goes stale.

use crate::config::PersistenceConfig;
use serde::{Serialize, Deserialize};

/// Persistence bookkeeping of one reservoir.
///
/// Times are seconds relative to the start of the loop that will consume the
/// record; the executor rebases them once a loop is done.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistenceRecord {
    /// When the persisted outflow was last refreshed by an observation.
    pub update_time: f64,
    pub prev_persisted_outflow: Option<f64>,
    /// When the persistence index next advances.
    pub persistence_update_time: f64,
    /// Completed persistence periods since `update_time`.
    pub persistence_index: u32,
}

impl Default for PersistenceRecord {
    fn default() -> Self {
        Self {
            update_time: 0.0,
            prev_persisted_outflow: None,
            persistence_update_time: 0.0,
            persistence_index: 0,
        }
    }
}

/// Outflow chosen for one reservoir timestep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Release {
    /// A valid observation replaced the outflow.
    Observed(f64),
    /// The previous persisted outflow was held.
    Persisted(f64),
    /// Nothing usable was carried; the routed outflow stands.
    Routed(f64),
}

impl Release {
    pub fn flow(&self) -> f64 {
        match *self {
            Release::Observed(q) | Release::Persisted(q) | Release::Routed(q) => q,
        }
    }
}

impl PersistenceRecord {
    /// Decides the release at `now` (seconds from loop start, end of timestep).
    pub fn step(&mut self, now: f64, observation: Option<f64>, routed: f64, cfg: &PersistenceConfig) -> Release {
        if let Some(q) = observation {
            self.prev_persisted_outflow = Some(q);
            self.update_time = now;
            self.persistence_index = 0;
            self.persistence_update_time = now + cfg.update_seconds;
            return Release::Observed(q);
        }

        if now >= self.persistence_update_time {
            let periods = ((now - self.persistence_update_time) / cfg.update_seconds).floor() as u32 + 1;
            self.persistence_index = self.persistence_index.saturating_add(periods);
            self.persistence_update_time += periods as f64 * cfg.update_seconds;
        }

        match self.prev_persisted_outflow {
            Some(q) if self.persistence_index < cfg.max_persistence_index => Release::Persisted(q),
            _ => Release::Routed(routed),
        }
    }

    /// Shifts the time origin forward by `elapsed` seconds.
    pub fn rebase(&mut self, elapsed: f64) {
        self.update_time -= elapsed;
        self.persistence_update_time -= elapsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max: u32) -> PersistenceConfig {
        PersistenceConfig { enabled: true, update_seconds: 3600.0, max_persistence_index: max }
    }

    #[test]
    fn test_unobserved_reservoir_routes() {
        let mut rec = PersistenceRecord::default();
        assert_eq!(rec.step(300.0, None, 4.0, &cfg(2)), Release::Routed(4.0));
    }

    #[test]
    fn test_observation_is_held_until_stale() {
        let cfg = cfg(2);
        let mut rec = PersistenceRecord::default();
        assert_eq!(rec.step(0.0, Some(10.0), 4.0, &cfg), Release::Observed(10.0));
        assert_eq!(rec.persistence_update_time, 3600.0);

        assert_eq!(rec.step(1800.0, None, 4.0, &cfg), Release::Persisted(10.0));
        assert_eq!(rec.step(3600.0, None, 4.0, &cfg), Release::Persisted(10.0));
        assert_eq!(rec.persistence_index, 1);
        // Second period completes: index reaches the limit.
        assert_eq!(rec.step(7200.0, None, 4.0, &cfg), Release::Routed(4.0));
        assert_eq!(rec.persistence_index, 2);
    }

    #[test]
    fn test_skipped_periods_are_all_counted() {
        let cfg = cfg(10);
        let mut rec = PersistenceRecord { prev_persisted_outflow: Some(1.0), persistence_update_time: 100.0, ..Default::default() };
        rec.step(100.0 + 3.5 * 3600.0, None, 0.0, &cfg);
        assert_eq!(rec.persistence_index, 4);
        assert_eq!(rec.persistence_update_time, 100.0 + 4.0 * 3600.0);
    }

    #[test]
    fn test_rebase_moves_the_origin() {
        let mut rec = PersistenceRecord { update_time: 1200.0, persistence_update_time: 4800.0, ..Default::default() };
        rec.rebase(3600.0);
        assert_eq!(rec.update_time, -2400.0);
        assert_eq!(rec.persistence_update_time, 1200.0);
    }
}

//! Typed run configuration. Every recognised option is enumerated and
//! defaulted here; nothing is looked up by name at call time.

use crate::error::RoutingError;
use crate::store::TerminalCode;
use serde::{Serialize, Deserialize};

/// What the reach executor does when the kernel fails on one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Substitute a pass-through cell, log it, and keep marching.
    #[default]
    Fallback,
    /// Stop the reach; its independent network emits no results this loop.
    AbortReach,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub terminal_code: TerminalCode,
    /// Reject segments claimed by two tailwaters.
    pub check_disjoint: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { terminal_code: TerminalCode(0), check_disjoint: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgingConfig {
    pub enabled: bool,
    /// e-folding time (s) of the weight given to the last valid observation.
    pub decay_seconds: f64,
}

impl Default for NudgingConfig {
    fn default() -> Self {
        Self { enabled: true, decay_seconds: 7200.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// Length (s) of one persistence period.
    pub update_seconds: f64,
    /// Number of periods a persisted outflow stays valid without a new observation.
    pub max_persistence_index: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { enabled: true, update_seconds: 3600.0, max_persistence_index: 240 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Routing timestep (s).
    pub dt: f64,
    /// Timesteps per simulation loop.
    pub nts: usize,
    /// Worker threads for network dispatch; 0 lets rayon decide.
    pub workers: usize,
    pub fault_policy: FaultPolicy,
    /// Record `cn`, `ck` and `X` per cell.
    pub return_courant: bool,
    pub network: NetworkConfig,
    pub nudging: NudgingConfig,
    pub persistence: PersistenceConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            dt: 300.0,
            nts: 12,
            workers: 0,
            fault_policy: FaultPolicy::default(),
            return_courant: false,
            network: NetworkConfig::default(),
            nudging: NudgingConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl RoutingConfig {
    pub fn from_json(json: &str) -> Result<Self, RoutingError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RoutingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Duration of one simulation loop (s).
    pub fn loop_seconds(&self) -> f64 {
        self.dt * self.nts as f64
    }

    pub fn validate(&self) -> Result<(), RoutingError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(RoutingError::InvalidConfig(format!("dt must be positive, got {}", self.dt)));
        }
        if self.nts == 0 {
            return Err(RoutingError::InvalidConfig("nts must be at least 1".into()));
        }
        if !(self.nudging.decay_seconds.is_finite() && self.nudging.decay_seconds > 0.0) {
            return Err(RoutingError::InvalidConfig(format!(
                "nudging.decay_seconds must be positive, got {}",
                self.nudging.decay_seconds
            )));
        }
        if !(self.persistence.update_seconds.is_finite() && self.persistence.update_seconds > 0.0) {
            return Err(RoutingError::InvalidConfig(format!(
                "persistence.update_seconds must be positive, got {}",
                self.persistence.update_seconds
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = RoutingConfig::from_json(r#"{ "dt": 60.0, "fault_policy": "abort_reach", "nudging": { "enabled": false } }"#).unwrap();
        assert_eq!(cfg.dt, 60.0);
        assert_eq!(cfg.nts, 12);
        assert_eq!(cfg.fault_policy, FaultPolicy::AbortReach);
        assert!(!cfg.nudging.enabled);
        assert_eq!(cfg.nudging.decay_seconds, 7200.0);
        assert!(cfg.network.check_disjoint);
    }

    #[rstest]
    #[case(r#"{ "dt": 0.0 }"#)]
    #[case(r#"{ "dt": -5.0 }"#)]
    #[case(r#"{ "nts": 0 }"#)]
    #[case(r#"{ "nudging": { "decay_seconds": 0.0 } }"#)]
    #[case(r#"{ "persistence": { "update_seconds": -1.0 } }"#)]
    #[case(r#"{ "fault_policy": "explode" }"#)]
    fn test_invalid_configs_are_rejected(#[case] json: &str) {
        let err = RoutingConfig::from_json(json).unwrap_err();
        assert!(err.is_configuration(), "{}", err);
    }

    #[test]
    fn test_loop_seconds() {
        let cfg = RoutingConfig { dt: 300.0, nts: 12, ..Default::default() };
        assert_eq!(cfg.loop_seconds(), 3600.0);
    }
}

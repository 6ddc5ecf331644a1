//! Engine configuration

use crate::category::TrafficCategory;
use crate::history::HISTORY_CAPACITY;
use crate::qos::{self, QosRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Engine tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Budget used when a caller does not supply one (Mbps)
    pub total_bandwidth_mbps: f64,
    /// Throughput samples kept per category
    pub history_capacity: usize,
    /// Bound on a single strategy call (ms)
    pub strategy_timeout_ms: u64,
    /// Flows idle this long are dropped from reporting (s)
    pub flow_idle_timeout_secs: u64,
    /// QoS rules installed at startup
    pub default_rules: BTreeMap<TrafficCategory, QosRule>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            total_bandwidth_mbps: 100.0,
            history_capacity: HISTORY_CAPACITY,
            strategy_timeout_ms: 250,
            flow_idle_timeout_secs: 300,
            default_rules: qos::default_rules(),
        }
    }
}

impl EngineConfig {
    /// Strategy timeout as a duration
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    /// Flow idle timeout as a duration
    pub fn flow_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.flow_idle_timeout_secs)
    }
}

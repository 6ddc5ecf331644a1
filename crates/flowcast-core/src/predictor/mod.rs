//! Bandwidth prediction
//!
//! Every call records the reported throughput into [`MetricsHistory`] first,
//! then estimates. The heuristic is always available; an optional
//! [`EstimationStrategy`] takes over once a category has enough history, and
//! any failure or timeout there falls back to the heuristic.
//!
//! Heuristic:
//!
//! ```text
//! predicted  = base[category] × min(rate / 1000, 2.0) × min(avg_size / 1500, 1.5)
//! confidence = clamp(100 − var(last 5) × 10, 50, 95)   if history > 5
//!            = 70                                       if tracked
//!            = 60                                       otherwise
//! ```

mod linear;
mod strategy;

pub use linear::{LinearSequenceModel, SEQUENCE_LEN};
pub use strategy::{EstimationStrategy, Estimate, StrategyError};

use crate::category::{self, TrafficCategory};
use crate::history::{self, MetricsHistory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Name reported for heuristic predictions
pub const HEURISTIC: &str = "heuristic";

/// Samples required before any strategy replaces the heuristic
pub const MIN_STRATEGY_HISTORY: usize = 10;

/// Default bound on a strategy call
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_millis(250);

/// Observed traffic for one category over a sample interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficMetrics {
    /// Traffic category
    #[serde(alias = "traffic_type", deserialize_with = "category::deserialize_lossy")]
    pub category: TrafficCategory,
    /// Packets seen
    #[serde(default)]
    pub packet_count: u64,
    /// Bytes seen
    #[serde(default)]
    pub byte_count: u64,
    /// Mean packet size in bytes
    pub average_packet_size: f64,
    /// Packets per second
    pub packet_rate: f64,
    /// Measured throughput in Mbps
    pub current_throughput: f64,
    /// Observation time
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl TrafficMetrics {
    /// Metrics stamped now
    pub fn new(
        category: TrafficCategory,
        packet_rate: f64,
        average_packet_size: f64,
        current_throughput: f64,
    ) -> Self {
        Self {
            category,
            packet_count: 0,
            byte_count: 0,
            average_packet_size,
            packet_rate,
            current_throughput,
            timestamp: Utc::now(),
        }
    }
}

/// Bandwidth estimate for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Traffic category
    #[serde(alias = "traffic_type", deserialize_with = "category::deserialize_lossy")]
    pub category: TrafficCategory,
    /// Predicted bandwidth in Mbps, non-negative, 2 decimals
    pub predicted_bandwidth_mbps: f64,
    /// Confidence 0-100, 1 decimal
    pub confidence: f64,
    /// Echoed throughput, 2 decimals
    #[serde(default)]
    pub current_throughput_mbps: f64,
    /// Echoed packet rate, 2 decimals
    #[serde(default)]
    pub packet_rate: f64,
    /// Echoed mean packet size, 2 decimals
    #[serde(default)]
    pub average_packet_size: f64,
    /// Observation time of the input metrics
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Producer of the estimate
    #[serde(default = "heuristic_name")]
    pub strategy: String,
    /// Strategy failed and the heuristic was substituted
    #[serde(default)]
    pub fallback: bool,
}

fn heuristic_name() -> String {
    HEURISTIC.to_string()
}

impl PredictionResult {
    /// Bare prediction, as supplied to the allocator
    pub fn new(category: TrafficCategory, predicted_bandwidth_mbps: f64) -> Self {
        Self {
            category,
            predicted_bandwidth_mbps,
            confidence: 0.0,
            current_throughput_mbps: 0.0,
            packet_rate: 0.0,
            average_packet_size: 0.0,
            timestamp: Utc::now(),
            strategy: heuristic_name(),
            fallback: false,
        }
    }
}

/// Round to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[inline]
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Bandwidth predictor
pub struct BandwidthPredictor {
    history: Arc<MetricsHistory>,
    strategy: Option<Arc<dyn EstimationStrategy>>,
    timeout: Duration,
    fallbacks: AtomicU64,
}

impl BandwidthPredictor {
    /// Heuristic-only predictor over `history`
    pub fn new(history: Arc<MetricsHistory>) -> Self {
        Self {
            history,
            strategy: None,
            timeout: DEFAULT_STRATEGY_TIMEOUT,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Use `strategy` once enough history exists
    pub fn with_strategy(mut self, strategy: Arc<dyn EstimationStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Bound each strategy call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shared history
    pub fn history(&self) -> &Arc<MetricsHistory> {
        &self.history
    }

    /// Name of the configured strategy, `heuristic` when none
    pub fn strategy_name(&self) -> &str {
        self.strategy.as_deref().map_or(HEURISTIC, |s| s.name())
    }

    /// Strategy calls replaced by the heuristic so far
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Predict bandwidth for one category
    ///
    /// Never fails. Non-finite throughput is not recorded.
    pub async fn predict(&self, metrics: &TrafficMetrics) -> PredictionResult {
        let category = metrics.category;
        if metrics.current_throughput.is_finite() {
            self.history.record(category, metrics.current_throughput);
        }

        let mut fallback = false;
        let mut produced = None;

        if let Some(strategy) = &self.strategy {
            let available = self.history.len(category);
            let needed = strategy.min_history().max(MIN_STRATEGY_HISTORY);
            if category.tracked_index().is_some() && available >= needed {
                match self.run_strategy(strategy.as_ref(), category).await {
                    Ok(estimate) => produced = Some((estimate, strategy.name().to_string())),
                    Err(e) => {
                        warn!(%category, strategy = strategy.name(), error = %e, "estimation strategy failed, using heuristic");
                        self.fallbacks.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("flowcast_strategy_fallbacks_total").increment(1);
                        fallback = true;
                    }
                }
            }
        }

        let (estimate, strategy) =
            produced.unwrap_or_else(|| (self.heuristic(metrics), heuristic_name()));

        debug!(%category, predicted = estimate.bandwidth_mbps, confidence = estimate.confidence, strategy = %strategy, "prediction");

        PredictionResult {
            category,
            predicted_bandwidth_mbps: round_to(estimate.bandwidth_mbps, 2),
            confidence: round_to(estimate.confidence, 1),
            current_throughput_mbps: round_to(finite_or_zero(metrics.current_throughput), 2),
            packet_rate: round_to(finite_or_zero(metrics.packet_rate), 2),
            average_packet_size: round_to(finite_or_zero(metrics.average_packet_size), 2),
            timestamp: metrics.timestamp,
            strategy,
            fallback,
        }
    }

    /// Predict each entry in order
    pub async fn predict_batch(&self, batch: &[TrafficMetrics]) -> Vec<PredictionResult> {
        let mut results = Vec::with_capacity(batch.len());
        for metrics in batch {
            results.push(self.predict(metrics).await);
        }
        results
    }

    async fn run_strategy(
        &self,
        strategy: &dyn EstimationStrategy,
        category: TrafficCategory,
    ) -> Result<Estimate, StrategyError> {
        let samples = self.history.window(category, self.history.capacity());
        let estimate = tokio::time::timeout(self.timeout, strategy.estimate(&samples))
            .await
            .map_err(|_| StrategyError::Timeout(self.timeout))??;

        if !estimate.bandwidth_mbps.is_finite() || !estimate.confidence.is_finite() {
            return Err(StrategyError::Model("non-finite estimate".to_string()));
        }
        Ok(Estimate {
            bandwidth_mbps: estimate.bandwidth_mbps.max(0.1),
            confidence: estimate.confidence.clamp(0.0, 100.0),
        })
    }

    /// Heuristic estimate; reads history but does not record
    pub fn heuristic(&self, metrics: &TrafficMetrics) -> Estimate {
        let category = metrics.category;
        let rate_factor = (finite_or_zero(metrics.packet_rate) / 1000.0).min(2.0);
        let size_factor = (finite_or_zero(metrics.average_packet_size) / 1500.0).min(1.5);
        let predicted = (category.base_bandwidth_mbps() * rate_factor * size_factor).max(0.0);

        let confidence = if category.tracked_index().is_none() {
            60.0
        } else if self.history.len(category) > 5 {
            let recent = self.history.window(category, 5);
            (100.0 - history::variance(&recent) * 10.0).clamp(50.0, 95.0)
        } else {
            70.0
        };

        Estimate {
            bandwidth_mbps: predicted,
            confidence,
        }
    }
}

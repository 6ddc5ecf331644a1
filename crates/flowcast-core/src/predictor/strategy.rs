//! Pluggable estimation strategy

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Output of an estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    /// Predicted bandwidth in Mbps
    pub bandwidth_mbps: f64,
    /// Confidence 0-100
    pub confidence: f64,
}

/// Why a strategy could not produce an estimate
///
/// Never surfaced to callers of `predict`; the heuristic is substituted.
#[derive(Error, Debug)]
pub enum StrategyError {
    /// Call exceeded the configured bound
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Not enough samples to run
    #[error("needs {needed} samples, have {actual}")]
    InsufficientHistory {
        /// Samples required
        needed: usize,
        /// Samples available
        actual: usize,
    },

    /// Model evaluation failed
    #[error("model error: {0}")]
    Model(String),
}

/// Alternative bandwidth estimator over a category's throughput history
///
/// `history` is oldest-first and includes the sample recorded by the current
/// call. Implementations must be read-only; parameters are fixed at
/// construction.
#[async_trait]
pub trait EstimationStrategy: Send + Sync {
    /// Name reported on predictions this strategy produced
    fn name(&self) -> &str;

    /// Samples required before the strategy is consulted
    ///
    /// Values below the predictor's floor of 10 have no effect.
    fn min_history(&self) -> usize {
        10
    }

    /// Produce an estimate from history
    async fn estimate(&self, history: &[f64]) -> Result<Estimate, StrategyError>;
}

//! Linear sequence model
//!
//! Autoregressive estimator over the last [`SEQUENCE_LEN`] throughput
//! samples. Parameters are trained offline and loaded read-only from JSON:
//!
//! ```json
//! { "name": "linear-ar10", "weights": [0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1], "bias": 0.0 }
//! ```
//!
//! `weights[0]` applies to the oldest sample of the window.

use super::strategy::{EstimationStrategy, Estimate, StrategyError};
use crate::error::{FlowcastError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Samples consumed per estimate
pub const SEQUENCE_LEN: usize = 10;

fn default_name() -> String {
    "linear".to_string()
}

/// Read-only autoregressive model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSequenceModel {
    /// Name reported on predictions
    #[serde(default = "default_name")]
    pub name: String,
    /// One weight per window position, oldest first
    pub weights: Vec<f64>,
    /// Intercept
    #[serde(default)]
    pub bias: f64,
}

impl LinearSequenceModel {
    /// Build and validate a model
    pub fn new(name: impl Into<String>, weights: Vec<f64>, bias: f64) -> Result<Self> {
        let model = Self {
            name: name.into(),
            weights,
            bias,
        };
        model.validate()?;
        Ok(model)
    }

    /// Load parameters from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Parse parameters from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)
            .map_err(|e| FlowcastError::EstimationStrategy(format!("invalid model parameters: {e}")))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.weights.len() != SEQUENCE_LEN {
            return Err(FlowcastError::EstimationStrategy(format!(
                "expected {SEQUENCE_LEN} weights, got {}",
                self.weights.len()
            )));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(FlowcastError::EstimationStrategy(
                "model parameters must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Evaluate on the trailing window of `history`
    pub fn evaluate(&self, history: &[f64]) -> std::result::Result<f64, StrategyError> {
        if history.len() < SEQUENCE_LEN {
            return Err(StrategyError::InsufficientHistory {
                needed: SEQUENCE_LEN,
                actual: history.len(),
            });
        }
        let window = &history[history.len() - SEQUENCE_LEN..];
        let output = window
            .iter()
            .zip(&self.weights)
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.bias;

        if !output.is_finite() {
            return Err(StrategyError::Model(format!("non-finite output {output}")));
        }
        Ok(output)
    }
}

#[async_trait]
impl EstimationStrategy for LinearSequenceModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_history(&self) -> usize {
        SEQUENCE_LEN
    }

    async fn estimate(&self, history: &[f64]) -> std::result::Result<Estimate, StrategyError> {
        let output = self.evaluate(history)?;
        Ok(Estimate {
            bandwidth_mbps: output.max(0.1),
            confidence: (70.0 + history.len() as f64 / 100.0).min(95.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn averaging() -> LinearSequenceModel {
        LinearSequenceModel::new("avg", vec![0.1; SEQUENCE_LEN], 0.0).unwrap()
    }

    #[tokio::test]
    async fn test_moving_average() {
        let model = averaging();
        let history: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let est = model.estimate(&history).await.unwrap();
        // mean of 2..=11
        assert!((est.bandwidth_mbps - 6.5).abs() < 1e-9);
        assert!((est.confidence - 70.12).abs() < 1e-9);
    }

    #[test]
    fn test_floor_and_short_history() {
        let model = LinearSequenceModel::new("neg", vec![0.0; SEQUENCE_LEN], -3.0).unwrap();
        let est = tokio_test::block_on(model.estimate(&[1.0; 10])).unwrap();
        assert_eq!(est.bandwidth_mbps, 0.1);

        let err = tokio_test::block_on(model.estimate(&[1.0; 4])).unwrap_err();
        assert!(matches!(err, StrategyError::InsufficientHistory { needed: 10, actual: 4 }));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(LinearSequenceModel::new("short", vec![1.0; 3], 0.0).is_err());
        assert!(LinearSequenceModel::from_json(r#"{"weights": [1.0], "bias": 0.0}"#).is_err());
        assert!(LinearSequenceModel::from_json("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"weights": [0,0,0,0,0,0,0,0,0,1], "bias": 0.5}}"#).unwrap();
        let model = LinearSequenceModel::load(file.path()).unwrap();
        assert_eq!(model.name, "linear");
        let history: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        assert_eq!(model.evaluate(&history).unwrap(), 10.5);
    }
}

//! Prediction and allocation endpoints

use super::{ApiJson, AppState};
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use flowcast_core::category::{self, TrafficCategory};
use flowcast_core::{AllocationResult, PredictionResult, TrafficMetrics};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_packet_size() -> f64 {
    1500.0
}

fn default_packet_rate() -> f64 {
    100.0
}

/// Observed metrics for one category; omitted fields take defaults
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionRequest {
    /// Category name, unknown names map to `unknown`
    #[serde(rename = "traffic_type", alias = "category", deserialize_with = "category::deserialize_lossy")]
    pub category: TrafficCategory,
    /// Packets seen
    #[serde(default)]
    pub packet_count: u64,
    /// Bytes seen
    #[serde(default)]
    pub byte_count: u64,
    /// Mean packet size in bytes
    #[serde(default = "default_packet_size")]
    pub average_packet_size: f64,
    /// Packets per second
    #[serde(default = "default_packet_rate")]
    pub packet_rate: f64,
    /// Measured throughput in Mbps
    #[serde(default)]
    pub current_throughput: f64,
    /// Observation time, defaults to now
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<PredictionRequest> for TrafficMetrics {
    fn from(req: PredictionRequest) -> Self {
        TrafficMetrics {
            category: req.category,
            packet_count: req.packet_count,
            byte_count: req.byte_count,
            average_packet_size: req.average_packet_size,
            packet_rate: req.packet_rate,
            current_throughput: req.current_throughput,
            timestamp: req.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// Predictions to make, then allocate against a budget
#[derive(Debug, Deserialize)]
pub struct AllocationRequest {
    /// One entry per category
    pub predictions: Vec<PredictionRequest>,
    /// Budget in Mbps, defaults to the configured total
    #[serde(default)]
    pub total_bandwidth_mbps: Option<f64>,
}

/// Allocation plus the predictions it was computed from
#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    /// Predictions, in request order
    pub predictions: Vec<PredictionResult>,
    /// Resulting split
    pub allocation: AllocationResult,
}

/// `POST /predict`
pub async fn predict(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<PredictionRequest>,
) -> Json<PredictionResult> {
    let metrics = TrafficMetrics::from(req);
    Json(state.engine.predict(&metrics).await)
}

/// `POST /predict/batch`
pub async fn predict_batch(
    State(state): State<Arc<AppState>>,
    ApiJson(batch): ApiJson<Vec<PredictionRequest>>,
) -> Json<Vec<PredictionResult>> {
    let batch: Vec<TrafficMetrics> = batch.into_iter().map(TrafficMetrics::from).collect();
    Json(state.engine.predict_batch(&batch).await)
}

/// `POST /allocate`
pub async fn allocate(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<AllocationRequest>,
) -> Json<AllocationResponse> {
    let batch: Vec<TrafficMetrics> = req.predictions.into_iter().map(TrafficMetrics::from).collect();
    let predictions = state.engine.predict_batch(&batch).await;
    let total = req
        .total_bandwidth_mbps
        .unwrap_or(state.engine.config().total_bandwidth_mbps);
    let allocation = state.engine.allocate(&predictions, total);

    Json(AllocationResponse {
        predictions,
        allocation,
    })
}

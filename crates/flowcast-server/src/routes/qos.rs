//! QoS rule management and flow evaluation

use super::{ApiJson, AppState};
use crate::error::ApiError;
use axum::extract::State;
use axum::Json;
use flowcast_core::category::{self, TrafficCategory};
use flowcast_core::{FlowcastError, QosAction, QosRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Rule to install for a category
///
/// Priority and marking arrive as plain integers so out-of-range values are
/// reported as invalid rules rather than malformed JSON.
#[derive(Debug, Deserialize)]
pub struct QosRuleRequest {
    /// Category name
    #[serde(deserialize_with = "category::deserialize_lossy")]
    pub traffic_type: TrafficCategory,
    /// Floor in Mbps
    pub min_bandwidth: f64,
    /// Ceiling in Mbps
    pub max_bandwidth: f64,
    /// Priority 0-3
    pub priority: i64,
    /// DSCP marking 0-63
    #[serde(default, alias = "marking")]
    pub dscp: i64,
}

impl QosRuleRequest {
    fn to_rule(&self) -> Result<QosRule, FlowcastError> {
        let priority = u8::try_from(self.priority)
            .map_err(|_| FlowcastError::invalid_rule(format!("priority {} outside 0-3", self.priority)))?;
        let marking = u8::try_from(self.dscp)
            .map_err(|_| FlowcastError::invalid_rule(format!("marking {} outside 0-63", self.dscp)))?;
        let rule = QosRule::new(self.min_bandwidth, self.max_bandwidth, priority, marking);
        rule.validate()?;
        Ok(rule)
    }
}

/// Confirmation of an installed rule
#[derive(Debug, Serialize)]
pub struct RuleResponse {
    /// Always `success`
    pub status: &'static str,
    /// Human-readable summary
    pub message: String,
    /// Category the rule applies to
    pub category: TrafficCategory,
    /// Rule as stored
    pub rule: QosRule,
}

/// Installed rules keyed by category
#[derive(Debug, Serialize)]
pub struct RulesResponse {
    /// Rule table
    pub rules: BTreeMap<TrafficCategory, QosRule>,
}

/// Flow to evaluate
#[derive(Debug, Deserialize)]
pub struct QosApplyRequest {
    /// Caller-chosen flow identifier
    pub flow_id: String,
    /// Category name
    #[serde(alias = "category", deserialize_with = "category::deserialize_lossy")]
    pub traffic_type: TrafficCategory,
    /// Current bandwidth in Mbps
    pub current_bandwidth: f64,
}

/// `POST /qos/rule`
pub async fn set_rule(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<QosRuleRequest>,
) -> Result<Json<RuleResponse>, ApiError> {
    let rule = req.to_rule()?;
    state.engine.set_qos_rule(req.traffic_type, rule)?;

    Ok(Json(RuleResponse {
        status: "success",
        message: format!("QoS rule set for {}", req.traffic_type),
        category: req.traffic_type,
        rule,
    }))
}

/// `GET /qos/rules`
pub async fn list_rules(State(state): State<Arc<AppState>>) -> Json<RulesResponse> {
    Json(RulesResponse {
        rules: state.engine.qos_rules(),
    })
}

/// `POST /qos/apply`
pub async fn apply(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<QosApplyRequest>,
) -> Json<QosAction> {
    Json(
        state
            .engine
            .apply_qos(&req.flow_id, req.traffic_type, req.current_bandwidth),
    )
}

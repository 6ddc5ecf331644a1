//! Service index, health, stats and classification

use super::{ApiJson, AppState};
use crate::error::ApiError;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use flowcast_core::{ClassificationRule, EngineStats, ParsedPacket, RawFrame};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const SERVICE: &str = "flowcast";

/// Liveness body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy`
    pub status: &'static str,
    /// Service name
    pub service: &'static str,
    /// Crate version
    pub version: &'static str,
    /// RFC 3339 time of the check
    pub timestamp: String,
}

/// Engine state plus process info
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Service name
    pub service: &'static str,
    /// Crate version
    pub version: &'static str,
    /// Seconds since the router was built
    pub uptime_secs: i64,
    /// Engine counters
    pub engine: EngineStats,
}

/// Frame to classify
#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    /// Whole Ethernet frame, hex encoded
    pub frame: String,
}

/// Classification rule table
#[derive(Debug, Serialize)]
pub struct ClassificationRulesResponse {
    /// Rules in scan order
    pub rules: Vec<ClassificationRule>,
}

/// `GET /`
pub async fn index() -> Json<Value> {
    Json(json!({
        "service": SERVICE,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "stats": "GET /stats",
            "classify": "POST /classify",
            "classification_rules": "GET /classify/rules",
            "classification_rule": "POST /classify/rule",
            "predict": "POST /predict",
            "predict_batch": "POST /predict/batch",
            "allocate": "POST /allocate",
            "qos_rules": "GET /qos/rules",
            "qos_rule": "POST /qos/rule",
            "qos_apply": "POST /qos/apply",
        }
    }))
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// `GET /stats`
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        service: SERVICE,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        engine: state.engine.stats(),
    })
}

/// `POST /classify`
pub async fn classify(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<ClassifyRequest>,
) -> Result<Json<ParsedPacket>, ApiError> {
    let bytes = hex::decode(req.frame.trim())
        .map_err(|e| ApiError::bad_request(format!("frame is not valid hex: {e}")))?;
    let packet = state.engine.classify(&RawFrame::now(bytes))?;
    Ok(Json(packet))
}

/// `GET /classify/rules`
pub async fn classification_rules(
    State(state): State<Arc<AppState>>,
) -> Json<ClassificationRulesResponse> {
    Json(ClassificationRulesResponse {
        rules: state.engine.classification_rules(),
    })
}

/// `POST /classify/rule`
pub async fn set_classification_rule(
    State(state): State<Arc<AppState>>,
    ApiJson(rule): ApiJson<ClassificationRule>,
) -> Result<Json<ClassificationRulesResponse>, ApiError> {
    state.engine.set_classification_rule(rule)?;
    Ok(Json(ClassificationRulesResponse {
        rules: state.engine.classification_rules(),
    }))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{app, get, post, post_raw};
    use axum::http::StatusCode;
    use flowcast_core::fixture::FrameBuilder;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_and_index() {
        let (status, body) = get(app(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "flowcast");

        let (status, body) = get(app(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["endpoints"]["allocate"], "POST /allocate");
    }

    #[tokio::test]
    async fn test_classify_frame() {
        let frame = FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 1935).build_bytes();
        let (status, body) = post(app(), "/classify", json!({"frame": hex::encode(frame)})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category"], "video");
        assert_eq!(body["priority"], 3);
        assert_eq!(body["destination_ip"], "10.0.0.2");
        assert_eq!(body["transport"]["kind"], "tcp");
    }

    #[tokio::test]
    async fn test_classify_rejects_bad_input() {
        let (status, body) = post(app(), "/classify", json!({"frame": "zz"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "bad_request");

        let (status, body) = post(app(), "/classify", json!({"frame": "00112233"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "malformed_frame");
    }

    #[tokio::test]
    async fn test_unparseable_body_is_json_error() {
        let (status, body) = post_raw(app(), "/classify", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_body");
        assert!(body["message"].is_string());

        let (status, body) = post_raw(app(), "/qos/apply", r#"{"flow_id": 7}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "invalid_body");
    }

    #[tokio::test]
    async fn test_replace_classification_rule() {
        let app = app();
        let rule = json!({"category": "background", "ports": [8125], "protocols": ["statsd"]});
        let (status, body) = post(app.clone(), "/classify/rule", rule).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rules"][3]["ports"], json!([8125]));

        let frame = FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 8125).build_bytes();
        let (_, body) = post(app.clone(), "/classify", json!({"frame": hex::encode(frame)})).await;
        assert_eq!(body["category"], "background");

        let unknown = json!({"category": "unknown", "ports": [1], "protocols": []});
        let (status, _) = post(app, "/classify/rule", unknown).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_stats_shape() {
        let (status, body) = get(app(), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["engine"]["rule_count"], 4);
        assert_eq!(body["engine"]["strategy"], "heuristic");
        assert_eq!(body["engine"]["frames_processed"], 0);
        assert!(body["engine"]["last_allocation"].is_null());
    }
}

//! HTTP routes
//!
//! | Method | Path               | Handler                          |
//! |--------|--------------------|----------------------------------|
//! | GET    | `/`                | endpoint index                   |
//! | GET    | `/health`          | liveness                         |
//! | GET    | `/stats`           | engine counters                  |
//! | POST   | `/classify`        | classify one hex-encoded frame   |
//! | GET    | `/classify/rules`  | classification rule table        |
//! | POST   | `/classify/rule`   | replace one classification rule  |
//! | POST   | `/predict`         | predict one category             |
//! | POST   | `/predict/batch`   | predict several categories       |
//! | POST   | `/allocate`        | predict, then divide the budget  |
//! | GET    | `/qos/rules`       | QoS rule table                   |
//! | POST   | `/qos/rule`        | install or replace a QoS rule    |
//! | POST   | `/qos/apply`       | evaluate a flow against its rule |

pub mod predict;
pub mod qos;
pub mod system;

use crate::error::ApiError;
use axum::extract::FromRequest;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use flowcast_core::TrafficEngine;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// JSON body extractor whose rejections use the API error body
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Shared handler state
pub struct AppState {
    /// Engine serving every request
    pub engine: Arc<TrafficEngine>,
    /// Process start, reported by `/stats`
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wrap `engine`
    pub fn new(engine: Arc<TrafficEngine>) -> Self {
        Self {
            engine,
            started_at: Utc::now(),
        }
    }
}

/// Build the full router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(system::index))
        .route("/health", get(system::health))
        .route("/stats", get(system::stats))
        .route("/classify", post(system::classify))
        .route("/classify/rules", get(system::classification_rules))
        .route("/classify/rule", post(system::set_classification_rule))
        .route("/predict", post(predict::predict))
        .route("/predict/batch", post(predict::predict_batch))
        .route("/allocate", post(predict::allocate))
        .route("/qos/rules", get(qos::list_rules))
        .route("/qos/rule", post(qos::set_rule))
        .route("/qos/apply", post(qos::apply))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use flowcast_core::EngineConfig;
    use serde_json::Value;
    use tower::ServiceExt;

    pub fn app() -> Router {
        let engine = Arc::new(TrafficEngine::new(EngineConfig::default()).unwrap());
        router(Arc::new(AppState::new(engine)))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(app, request).await
    }

    pub async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        post_raw(app, uri, body.to_string()).await
    }

    pub async fn post_raw(app: Router, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        send(app, request).await
    }
}

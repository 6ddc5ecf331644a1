//! Flowcast service
//!
//! HTTP front end and live capture around [`flowcast_core::TrafficEngine`].
//!
//! ```text
//!   AF_PACKET ──► CapturePipeline ──► ThroughputMeter ──(sample tick)──► MetricsHistory
//!                      │                                                     │
//!                      └──► CsvSink                                          ▼
//!                                                   HTTP ──► TrafficEngine (predict / allocate / qos)
//! ```

#![warn(missing_docs)]

pub mod capture;
pub mod config;
pub mod error;
pub mod routes;
pub mod sink;

pub use capture::{spawn_sampler, Capture};
pub use config::{CaptureConfig, ServerConfig};
pub use error::{ApiError, ServerError};
pub use routes::{router, AppState};

use flowcast_core::{LinearSequenceModel, TrafficEngine};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Build the engine, loading the linear model when one is configured
pub fn build_engine(config: &ServerConfig) -> Result<TrafficEngine, ServerError> {
    let engine = match &config.model_path {
        Some(path) => {
            let model = LinearSequenceModel::load(path)?;
            tracing::info!(path = %path.display(), model = %model.name, "loaded estimation model");
            TrafficEngine::with_strategy(config.engine.clone(), Arc::new(model))?
        }
        None => TrafficEngine::new(config.engine.clone())?,
    };
    Ok(engine)
}

/// Install the Prometheus exporter on `addr`
pub fn install_metrics_exporter(addr: SocketAddr) -> Result<(), ServerError> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| ServerError::Config(format!("metrics exporter: {e}")))?;
    tracing::info!(%addr, "prometheus exporter listening");
    Ok(())
}

/// Serve the API until `shutdown` resolves
pub async fn serve<F>(addr: SocketAddr, state: Arc<AppState>, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Network(format!("bind {addr}: {e}")))?;
    tracing::info!(%addr, "flowcast API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Network(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_build_engine_with_model() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name": "ar10", "weights": [0.1,0.1,0.1,0.1,0.1,0.1,0.1,0.1,0.1,0.1]}}"#).unwrap();

        let config = ServerConfig {
            model_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let engine = build_engine(&config).unwrap();
        assert_eq!(engine.stats().strategy, "ar10");

        assert_eq!(build_engine(&ServerConfig::default()).unwrap().stats().strategy, "heuristic");
    }

    #[test]
    fn test_build_engine_bad_model() {
        let config = ServerConfig {
            model_path: Some("/nonexistent/model.json".into()),
            ..Default::default()
        };
        assert!(matches!(build_engine(&config), Err(ServerError::Engine(_))));
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let engine = Arc::new(TrafficEngine::new(Default::default()).unwrap());
        let state = Arc::new(AppState::new(engine));
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        serve(addr, state, async {}).await.unwrap();
    }
}

//! Service configuration
//!
//! JSON file, then CLI/env overrides on top.

use crate::error::ServerError;
use flowcast_core::pipeline::default_workers;
use flowcast_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address
    pub listen_addr: SocketAddr,
    /// Prometheus exporter address (disabled when absent)
    pub metrics_addr: Option<SocketAddr>,
    /// Live capture settings
    pub capture: CaptureConfig,
    /// Linear model parameter file (heuristic only when absent)
    pub model_path: Option<PathBuf>,
    /// Engine tunables
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            metrics_addr: None,
            capture: CaptureConfig::default(),
            model_path: None,
            engine: EngineConfig::default(),
        }
    }
}

/// Live capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Run the capture pipeline
    pub enabled: bool,
    /// Interface to bind (all when absent)
    pub interface: Option<String>,
    /// Stop after this many frames (0 = unlimited)
    pub packet_count: u64,
    /// CSV file receiving every classified packet
    pub csv_output: Option<PathBuf>,
    /// Meter drain interval (ms)
    pub sample_interval_ms: u64,
    /// Parse/classify worker threads
    pub workers: usize,
    /// Frames buffered between the socket and workers
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interface: None,
            packet_count: 0,
            csv_output: None,
            sample_interval_ms: 1000,
            workers: default_workers(),
            channel_capacity: 4096,
        }
    }
}

impl CaptureConfig {
    /// Sample interval as a duration (at least 1 ms)
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}

impl ServerConfig {
    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    /// Load `path`, falling back to defaults when it does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ServerError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                tracing::warn!(path = %path.display(), "config not found, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }
}

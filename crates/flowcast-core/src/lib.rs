//! Flowcast core
//!
//! Frame parsing, traffic classification, throughput history, bandwidth
//! prediction, priority allocation and QoS decisioning.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │ FrameSource  │──►│ FrameParser │──►│  Classifier  │──►│ Meter       │
//! │ (raw/fixture)│   │ eth/ip/l4   │   │ port → class │   │ bytes/pkts  │
//! └──────────────┘   └─────────────┘   └──────────────┘   └──────┬──────┘
//!                                                                │ sample
//!                                                                ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐  ┌─────────────┐
//! │ QosController│   │  Allocator   │◄──│  Predictor   │◄─│ History     │
//! │ rule → action│   │ 2-pass greedy│   │ heuristic/AR │  │ 100 / class │
//! └──────────────┘   └──────────────┘   └──────────────┘  └─────────────┘
//! ```
//!
//! [`TrafficEngine`] owns one of each and is the entry point for callers.

#![warn(missing_docs)]

pub mod allocator;
pub mod category;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod fixture;
pub mod history;
pub mod meter;
pub mod packet;
pub mod pipeline;
pub mod predictor;
pub mod qos;
pub mod source;

pub use allocator::{AllocationResult, BandwidthAllocator};
pub use category::{Priority, TrafficCategory};
pub use classifier::{Classification, ClassificationRule, TrafficClassifier};
pub use config::EngineConfig;
pub use engine::{EngineStats, TrafficEngine};
pub use error::{FlowcastError, Layer, Result};
pub use history::{MetricsHistory, HISTORY_CAPACITY};
pub use meter::{CaptureStats, CaptureStatsSnapshot, ThroughputMeter};
pub use packet::{ParsedPacket, RawFrame, Transport};
pub use pipeline::{CapturePipeline, PacketSink, PipelineConfig};
pub use predictor::{
    BandwidthPredictor, EstimationStrategy, Estimate, LinearSequenceModel, PredictionResult,
    StrategyError, TrafficMetrics,
};
pub use qos::{Action, QosAction, QosController, QosRule, Reason};
pub use source::{FixtureSource, FrameSource};

#[cfg(target_os = "linux")]
pub use source::RawSocketSource;

//! Engine facade
//!
//! Owns one instance of every component and exposes the operations the
//! request layer calls. Constructed once per process and shared by handle.

use crate::allocator::{AllocationResult, BandwidthAllocator};
use crate::category::TrafficCategory;
use crate::classifier::{ClassificationRule, TrafficClassifier};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::history::MetricsHistory;
use crate::meter::{CaptureStats, ThroughputMeter};
use crate::packet::{ParsedPacket, RawFrame};
use crate::pipeline::{CapturePipeline, PipelineConfig};
use crate::predictor::{BandwidthPredictor, EstimationStrategy, PredictionResult, TrafficMetrics};
use crate::qos::{Action, QosAction, QosController, QosRule};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Point-in-time engine state
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Samples held per tracked category
    pub history_sizes: BTreeMap<TrafficCategory, usize>,
    /// Most recent allocation, if any
    pub last_allocation: Option<AllocationResult>,
    /// Budget of the most recent allocation
    pub last_allocation_total: Option<f64>,
    /// QoS rules installed
    pub rule_count: usize,
    /// Flows seen since the last prune
    pub active_flow_count: usize,
    /// Active flows per last action
    pub flow_actions: BTreeMap<Action, usize>,
    /// Frames read by the capture pipeline
    pub frames_received: u64,
    /// Frames parsed and classified by the capture pipeline
    pub frames_processed: u64,
    /// Frames dropped as malformed
    pub frames_malformed: u64,
    /// Configured estimation strategy
    pub strategy: String,
    /// Strategy calls replaced by the heuristic
    pub strategy_fallbacks: u64,
}

/// Traffic engine
pub struct TrafficEngine {
    config: EngineConfig,
    classifier: Arc<TrafficClassifier>,
    history: Arc<MetricsHistory>,
    predictor: BandwidthPredictor,
    allocator: BandwidthAllocator,
    qos: QosController,
    meter: Arc<ThroughputMeter>,
    capture: Arc<CaptureStats>,
}

impl TrafficEngine {
    /// Heuristic-only engine
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Engine consulting `strategy` once history allows
    pub fn with_strategy(config: EngineConfig, strategy: Arc<dyn EstimationStrategy>) -> Result<Self> {
        Self::build(config, Some(strategy))
    }

    fn build(config: EngineConfig, strategy: Option<Arc<dyn EstimationStrategy>>) -> Result<Self> {
        let history = Arc::new(MetricsHistory::new(config.history_capacity));
        let mut predictor =
            BandwidthPredictor::new(Arc::clone(&history)).with_timeout(config.strategy_timeout());
        if let Some(strategy) = strategy {
            predictor = predictor.with_strategy(strategy);
        }
        let qos = QosController::with_rules(config.default_rules.clone())?;

        tracing::info!(
            strategy = predictor.strategy_name(),
            rules = qos.rule_count(),
            history_capacity = history.capacity(),
            "traffic engine ready"
        );

        Ok(Self {
            config,
            classifier: Arc::new(TrafficClassifier::new()),
            history,
            predictor,
            allocator: BandwidthAllocator::new(),
            qos,
            meter: Arc::new(ThroughputMeter::new()),
            capture: Arc::new(CaptureStats::default()),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parse and classify one frame
    pub fn classify(&self, frame: &RawFrame) -> Result<ParsedPacket> {
        let mut packet = ParsedPacket::parse(frame)?;
        self.classifier.classify_into(&mut packet);
        Ok(packet)
    }

    /// Replace one category's classification rule
    pub fn set_classification_rule(&self, rule: ClassificationRule) -> Result<()> {
        self.classifier.set_rule(rule)
    }

    /// Classification rules in scan order
    pub fn classification_rules(&self) -> Vec<ClassificationRule> {
        self.classifier.rules().as_ref().clone()
    }

    /// Predict bandwidth; never fails
    pub async fn predict(&self, metrics: &TrafficMetrics) -> PredictionResult {
        self.predictor.predict(metrics).await
    }

    /// Predict each entry, order preserved
    pub async fn predict_batch(&self, batch: &[TrafficMetrics]) -> Vec<PredictionResult> {
        self.predictor.predict_batch(batch).await
    }

    /// Allocate `total_bandwidth` across the predicted categories
    pub fn allocate(&self, predictions: &[PredictionResult], total_bandwidth: f64) -> AllocationResult {
        self.allocator.allocate(predictions, total_bandwidth)
    }

    /// Allocate against the configured budget
    pub fn allocate_default(&self, predictions: &[PredictionResult]) -> AllocationResult {
        self.allocate(predictions, self.config.total_bandwidth_mbps)
    }

    /// Upsert a QoS rule
    pub fn set_qos_rule(&self, category: TrafficCategory, rule: QosRule) -> Result<()> {
        self.qos.set_rule(category, rule)
    }

    /// All QoS rules
    pub fn qos_rules(&self) -> BTreeMap<TrafficCategory, QosRule> {
        self.qos.rules()
    }

    /// Decide the QoS action for a flow
    pub fn apply_qos(&self, flow_id: &str, category: TrafficCategory, current_bandwidth: f64) -> QosAction {
        let action = self.qos.apply_qos(flow_id, category, current_bandwidth);
        tracing::debug!(flow_id, %category, current_bandwidth, action = action.action.as_str(), "qos applied");
        action
    }

    /// Drain the meter over `elapsed` and record each category's throughput
    ///
    /// Categories without traffic in the interval record nothing.
    pub fn sample(&self, elapsed: Duration) -> Vec<TrafficMetrics> {
        let drained = self.meter.drain(elapsed);
        for m in &drained {
            if self.history.record(m.category, m.current_throughput) {
                metrics::gauge!("flowcast_throughput_mbps", "category" => m.category.as_str())
                    .set(m.current_throughput);
            }
        }
        drained
    }

    /// Drop flows idle past the configured timeout
    pub fn prune_flows(&self) -> usize {
        let pruned = self.qos.prune_flows(self.config.flow_idle_timeout());
        if pruned > 0 {
            tracing::debug!(pruned, "idle flows pruned");
        }
        pruned
    }

    /// Capture pipeline wired to this engine's classifier and meter
    pub fn capture_pipeline(&self, config: PipelineConfig) -> CapturePipeline {
        CapturePipeline::new(
            config,
            Arc::clone(&self.classifier),
            Arc::clone(&self.meter),
            Arc::clone(&self.capture),
        )
    }

    /// Shared history
    pub fn history(&self) -> &Arc<MetricsHistory> {
        &self.history
    }

    /// Current state
    pub fn stats(&self) -> EngineStats {
        let capture = self.capture.snapshot();
        let last_allocation = self.allocator.last();
        EngineStats {
            history_sizes: self.history.sizes().into_iter().collect(),
            last_allocation_total: last_allocation.as_ref().map(|a| a.total_bandwidth),
            last_allocation,
            rule_count: self.qos.rule_count(),
            active_flow_count: self.qos.active_flows(),
            flow_actions: self.qos.flow_actions(),
            frames_received: capture.received,
            frames_processed: capture.processed,
            frames_malformed: capture.malformed,
            strategy: self.predictor.strategy_name().to_string(),
            strategy_fallbacks: self.predictor.fallback_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowcastError;
    use crate::fixture::FrameBuilder;
    use crate::source::FixtureSource;

    fn engine() -> TrafficEngine {
        TrafficEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_classify_frame() {
        let e = engine();
        let packet = e
            .classify(&FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 5061).build())
            .unwrap();
        assert_eq!(packet.category, TrafficCategory::Voice);
        assert_eq!(packet.priority, 3);

        let err = e.classify(&RawFrame::now(vec![0u8; 13])).unwrap_err();
        assert!(matches!(err, FlowcastError::MalformedFrame { .. }));
    }

    #[tokio::test]
    async fn test_predict_then_allocate() {
        let e = engine();
        let batch = vec![
            TrafficMetrics::new(TrafficCategory::Video, 2000.0, 1500.0, 8.0),
            TrafficMetrics::new(TrafficCategory::File, 1000.0, 1500.0, 2.0),
        ];
        let predictions = e.predict_batch(&batch).await;
        assert_eq!(predictions[0].predicted_bandwidth_mbps, 10.0);
        assert_eq!(predictions[1].predicted_bandwidth_mbps, 2.0);

        let result = e.allocate_default(&predictions);
        assert!((result.allocations[&TrafficCategory::Video] - 12.0).abs() < 1e-9);
        assert!((result.allocations[&TrafficCategory::File] - 2.0).abs() < 1e-9);
        assert_eq!(result.utilization_percent, 14.0);

        let stats = e.stats();
        assert_eq!(stats.history_sizes[&TrafficCategory::Video], 1);
        assert_eq!(stats.last_allocation_total, Some(100.0));
        assert_eq!(stats.strategy, "heuristic");
    }

    #[test]
    fn test_rejected_seed_rule_fails_construction() {
        let mut config = EngineConfig::default();
        config
            .default_rules
            .insert(TrafficCategory::File, QosRule::new(10.0, 1.0, 1, 10));
        assert!(TrafficEngine::new(config).is_err());
    }

    #[test]
    fn test_qos_and_stats() {
        let e = engine();
        assert_eq!(e.apply_qos("f1", TrafficCategory::Voice, 20.0).action, Action::Throttle);
        e.set_qos_rule(TrafficCategory::Unknown, QosRule::new(0.0, 1.0, 0, 0)).unwrap();
        assert_eq!(e.qos_rules().len(), 5);

        let stats = e.stats();
        assert_eq!(stats.rule_count, 5);
        assert_eq!(stats.active_flow_count, 1);
        assert_eq!(e.prune_flows(), 0);
    }

    #[test]
    fn test_capture_feeds_history() {
        let e = engine();
        let frames = (0..10).map(|_| {
            FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2], 50000, 8554)
                .frame_size(1250)
                .build()
        });
        let mut pipeline = e.capture_pipeline(PipelineConfig {
            workers: 2,
            channel_capacity: 4,
            packet_limit: 0,
        });
        pipeline.start(Box::new(FixtureSource::new(frames))).unwrap();
        pipeline.wait();

        let sampled = e.sample(Duration::from_secs(1));
        assert_eq!(sampled.len(), 1);
        assert!((sampled[0].current_throughput - 0.1).abs() < 1e-12);
        assert_eq!(e.history().window(TrafficCategory::Video, 1), vec![sampled[0].current_throughput]);
        assert_eq!(e.stats().frames_processed, 10);

        // idle interval records nothing
        assert!(e.sample(Duration::from_secs(1)).is_empty());
        assert_eq!(e.history().len(TrafficCategory::Video), 1);
    }
}

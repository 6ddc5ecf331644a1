//! Live capture and periodic sampling

use crate::config::CaptureConfig;
use crate::error::ServerError;
use crate::sink::CsvSink;
use flowcast_core::{CapturePipeline, FrameSource, PacketSink, PipelineConfig, TrafficEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::task::JoinHandle;

/// Running capture pipeline plus its sink
pub struct Capture {
    pipeline: CapturePipeline,
    sink: Option<Arc<CsvSink>>,
}

impl Capture {
    /// Start capturing from `source`
    pub fn start(
        engine: &TrafficEngine,
        config: &CaptureConfig,
        source: Box<dyn FrameSource>,
    ) -> Result<Self, ServerError> {
        let sink = match &config.csv_output {
            Some(path) => Some(Arc::new(CsvSink::create(path)?)),
            None => None,
        };

        let mut pipeline = engine.capture_pipeline(PipelineConfig {
            workers: config.workers,
            channel_capacity: config.channel_capacity,
            packet_limit: config.packet_count,
        });
        if let Some(sink) = &sink {
            pipeline = pipeline.with_sink(Arc::clone(sink) as Arc<dyn PacketSink>);
        }
        pipeline.start(source)?;

        Ok(Self { pipeline, sink })
    }

    /// Open the platform capture socket for `config.interface`
    #[cfg(target_os = "linux")]
    pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn FrameSource>, ServerError> {
        let source = flowcast_core::RawSocketSource::open(config.interface.as_deref())?;
        Ok(Box::new(source))
    }

    /// Open the platform capture socket for `config.interface`
    #[cfg(not(target_os = "linux"))]
    pub fn open_source(_config: &CaptureConfig) -> Result<Box<dyn FrameSource>, ServerError> {
        Err(ServerError::Config("live capture requires Linux AF_PACKET".to_string()))
    }

    /// CSV sink, if configured
    pub fn sink(&self) -> Option<Arc<CsvSink>> {
        self.sink.clone()
    }

    /// Whether the source is still producing
    pub fn is_running(&self) -> bool {
        self.pipeline.is_running()
    }

    /// Block until the source is exhausted, then flush the sink
    pub fn wait(mut self) {
        self.pipeline.wait();
        self.flush();
    }

    /// Stop the source, drain workers and flush the sink
    pub fn stop(mut self) {
        self.pipeline.stop();
        self.flush();
    }

    fn flush(&self) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.flush() {
                tracing::warn!(error = %e, "csv flush failed");
            }
        }
    }
}

/// Drain the meter into history and prune idle flows every `interval`
pub fn spawn_sampler(
    engine: Arc<TrafficEngine>,
    interval: Duration,
    sink: Option<Arc<CsvSink>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        let mut last = Instant::now();

        loop {
            ticker.tick().await;
            let now = Instant::now();
            let sampled = engine.sample(now.duration_since(last));
            last = now;

            for m in &sampled {
                tracing::debug!(
                    category = %m.category,
                    packets = m.packet_count,
                    throughput_mbps = m.current_throughput,
                    "sampled"
                );
            }
            engine.prune_flows();

            if let Some(sink) = &sink {
                if let Err(e) = sink.flush() {
                    tracing::warn!(error = %e, "csv flush failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcast_core::fixture::FrameBuilder;
    use flowcast_core::{EngineConfig, FixtureSource, TrafficCategory};

    #[test]
    fn test_capture_writes_csv() {
        let engine = TrafficEngine::new(EngineConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let config = CaptureConfig {
            csv_output: Some(path.clone()),
            workers: 2,
            ..Default::default()
        };
        let frames = (0..5).map(|i| FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2], 40000 + i, 53).build());

        let capture = Capture::start(&engine, &config, Box::new(FixtureSource::new(frames))).unwrap();
        assert!(capture.sink().is_some());
        capture.wait();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 6);
        assert_eq!(engine.stats().frames_processed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_records_history() {
        let engine = Arc::new(TrafficEngine::new(EngineConfig::default()).unwrap());
        let config = CaptureConfig {
            workers: 1,
            ..Default::default()
        };
        let frames = (0..3).map(|_| FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 1935).build());
        Capture::start(&engine, &config, Box::new(FixtureSource::new(frames)))
            .unwrap()
            .wait();

        let handle = spawn_sampler(Arc::clone(&engine), Duration::from_secs(1), None);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();

        assert_eq!(engine.history().len(TrafficCategory::Video), 1);
    }
}

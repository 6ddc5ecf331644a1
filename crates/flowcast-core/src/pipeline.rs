//! Capture pipeline
//!
//! One source thread pulls frames from a [`FrameSource`] into a bounded
//! channel; N workers parse, classify and meter them, then hand the packet
//! to an optional [`PacketSink`]. Parse and classify touch no shared mutable
//! state, so workers scale freely.
//!
//! ```text
//! source ──► [bounded chan] ──► worker 0 ─┐
//!                          ├──► worker 1 ─┼──► meter / sink
//!                          └──► worker N ─┘
//! ```

use crate::classifier::TrafficClassifier;
use crate::error::{FlowcastError, Result};
use crate::meter::{CaptureStats, ThroughputMeter};
use crate::packet::{ParsedPacket, RawFrame};
use crate::source::FrameSource;
use crossbeam::channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Receiver of classified packets (CSV writer, log, ...)
pub trait PacketSink: Send + Sync {
    /// Called once per classified packet, from any worker
    fn accept(&self, packet: &ParsedPacket);
}

/// Pipeline sizing
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Worker threads
    pub workers: usize,
    /// Frames buffered between source and workers
    pub channel_capacity: usize,
    /// Stop after this many frames (0 = unlimited)
    pub packet_limit: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            channel_capacity: 4096,
            packet_limit: 0,
        }
    }
}

/// Available parallelism, at least 1
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Frame capture pipeline
pub struct CapturePipeline {
    config: PipelineConfig,
    running: Arc<AtomicBool>,
    classifier: Arc<TrafficClassifier>,
    meter: Arc<ThroughputMeter>,
    stats: Arc<CaptureStats>,
    sink: Option<Arc<dyn PacketSink>>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl CapturePipeline {
    /// Pipeline feeding `meter` and `stats`
    pub fn new(
        config: PipelineConfig,
        classifier: Arc<TrafficClassifier>,
        meter: Arc<ThroughputMeter>,
        stats: Arc<CaptureStats>,
    ) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            classifier,
            meter,
            stats,
            sink: None,
            threads: Vec::new(),
        }
    }

    /// Forward every classified packet to `sink`
    pub fn with_sink(mut self, sink: Arc<dyn PacketSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Spawn the source and worker threads
    pub fn start(&mut self, mut source: Box<dyn FrameSource>) -> Result<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(FlowcastError::Capture("pipeline already running".to_string()));
        }

        let (tx, rx) = bounded::<RawFrame>(self.config.channel_capacity.max(1));
        let workers = self.config.workers.max(1);

        for id in 0..workers {
            let worker = Worker {
                id,
                rx: rx.clone(),
                classifier: Arc::clone(&self.classifier),
                meter: Arc::clone(&self.meter),
                stats: Arc::clone(&self.stats),
                sink: self.sink.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("flowcast-worker-{id}"))
                .spawn(move || worker.run())
                .map_err(|e| self.spawn_failed(e))?;
            self.threads.push(handle);
        }
        drop(rx);

        source.attach_shutdown(Arc::clone(&self.running));
        let description = source.describe();
        let feeder = Feeder {
            source,
            tx,
            running: Arc::clone(&self.running),
            stats: Arc::clone(&self.stats),
            limit: self.config.packet_limit,
        };
        let handle = thread::Builder::new()
            .name("flowcast-source".to_string())
            .spawn(move || feeder.run())
            .map_err(|e| self.spawn_failed(e))?;
        self.threads.push(handle);

        tracing::info!(source = %description, workers, "capture pipeline started");
        Ok(())
    }

    fn spawn_failed(&self, e: std::io::Error) -> FlowcastError {
        self.running.store(false, Ordering::Release);
        FlowcastError::Capture(format!("failed to spawn capture thread: {e}"))
    }

    /// Whether the source is still producing
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shutdown flag shared with the source
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Block until the source is exhausted and workers have drained
    pub fn wait(&mut self) {
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("capture thread panicked");
            }
        }
    }

    /// Signal the source to stop, then drain
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.wait();
        tracing::info!("capture pipeline stopped");
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.stop();
        }
    }
}

struct Feeder {
    source: Box<dyn FrameSource>,
    tx: Sender<RawFrame>,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    limit: u64,
}

impl Feeder {
    fn run(mut self) {
        let mut received = 0u64;
        while self.running.load(Ordering::Relaxed) {
            if self.limit > 0 && received >= self.limit {
                tracing::info!(frames = received, "packet limit reached");
                break;
            }
            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    received += 1;
                    self.stats.received.fetch_add(1, Ordering::Relaxed);
                    if self.tx.send(frame).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(error = %e, "frame source failed");
                    break;
                }
            }
        }
        self.running.store(false, Ordering::Release);
        tracing::debug!(frames = received, "frame source finished");
    }
}

struct Worker {
    id: usize,
    rx: Receiver<RawFrame>,
    classifier: Arc<TrafficClassifier>,
    meter: Arc<ThroughputMeter>,
    stats: Arc<CaptureStats>,
    sink: Option<Arc<dyn PacketSink>>,
}

impl Worker {
    fn run(self) {
        tracing::debug!(worker = self.id, "capture worker starting");
        for frame in self.rx.iter() {
            self.process(&frame);
        }
        tracing::debug!(worker = self.id, "capture worker stopped");
    }

    #[inline]
    fn process(&self, frame: &RawFrame) {
        let mut packet = match ParsedPacket::parse(frame) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("flowcast_frames_malformed_total").increment(1);
                tracing::debug!(error = %e, len = frame.len(), "dropping malformed frame");
                return;
            }
        };

        let class = self.classifier.classify_into(&mut packet);
        self.meter.record(class.category, packet.size);
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("flowcast_frames_total", "category" => class.category.as_str()).increment(1);

        if let Some(sink) = &self.sink {
            sink.accept(&packet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::TrafficCategory;
    use crate::fixture::FrameBuilder;
    use crate::packet::RawFrame;
    use crate::source::FixtureSource;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect(Mutex<Vec<ParsedPacket>>);

    impl PacketSink for Collect {
        fn accept(&self, packet: &ParsedPacket) {
            self.0.lock().push(packet.clone());
        }
    }

    fn frames() -> Vec<RawFrame> {
        vec![
            FrameBuilder::tcp([10, 0, 0, 1], [10, 0, 0, 2], 50000, 1935).frame_size(1000).build(),
            FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 5060).build(),
            RawFrame::now(vec![0u8; 6]),
            FrameBuilder::udp([10, 0, 0, 1], [10, 0, 0, 2], 40000, 53).build(),
        ]
    }

    fn pipeline(config: PipelineConfig) -> (CapturePipeline, Arc<ThroughputMeter>, Arc<CaptureStats>) {
        let meter = Arc::new(ThroughputMeter::new());
        let stats = Arc::new(CaptureStats::default());
        let p = CapturePipeline::new(
            config,
            Arc::new(TrafficClassifier::new()),
            Arc::clone(&meter),
            Arc::clone(&stats),
        );
        (p, meter, stats)
    }

    #[test]
    fn test_fixture_run_to_completion() {
        let sink = Arc::new(Collect::default());
        let (p, meter, stats) = pipeline(PipelineConfig {
            workers: 2,
            channel_capacity: 2,
            packet_limit: 0,
        });
        let mut p = p.with_sink(sink.clone());

        p.start(Box::new(FixtureSource::new(frames()))).unwrap();
        p.wait();
        assert!(!p.is_running());

        let snap = stats.snapshot();
        assert_eq!(snap.received, 4);
        assert_eq!(snap.processed, 3);
        assert_eq!(snap.malformed, 1);

        let mut categories: Vec<_> = sink.0.lock().iter().map(|p| p.category).collect();
        categories.sort();
        assert_eq!(
            categories,
            vec![TrafficCategory::Video, TrafficCategory::Voice, TrafficCategory::Background]
        );

        let metrics = meter.drain(Duration::from_secs(1));
        let video = metrics.iter().find(|m| m.category == TrafficCategory::Video).unwrap();
        assert_eq!(video.byte_count, 1000);
    }

    #[test]
    fn test_packet_limit() {
        let (mut p, _meter, stats) = pipeline(PipelineConfig {
            workers: 1,
            channel_capacity: 16,
            packet_limit: 2,
        });
        p.start(Box::new(FixtureSource::new(frames()))).unwrap();
        p.wait();
        assert_eq!(stats.snapshot().received, 2);
    }

    #[test]
    fn test_restart_after_exhaustion() {
        let (mut p, _, _) = pipeline(PipelineConfig::default());
        p.start(Box::new(FixtureSource::default())).unwrap();
        p.wait();
        // source exhausted, running cleared
        assert!(p.start(Box::new(FixtureSource::default())).is_ok());
        p.stop();
    }
}

//! Throughput metering
//!
//! Lock-free per-category counters fed by the capture workers. The sampler
//! drains them once per interval into [`TrafficMetrics`].

use crate::category::TrafficCategory;
use crate::predictor::TrafficMetrics;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-category counters (cache-line aligned)
#[repr(C, align(64))]
#[derive(Default)]
struct CategoryCounters {
    packets: AtomicU64,
    bytes: AtomicU64,
}

/// Per-category packet and byte counters
pub struct ThroughputMeter {
    counters: [CategoryCounters; 5],
}

fn slot(category: TrafficCategory) -> usize {
    category.tracked_index().unwrap_or(4)
}

impl ThroughputMeter {
    /// Zeroed meter
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
        }
    }

    /// Count one packet
    #[inline(always)]
    pub fn record(&self, category: TrafficCategory, bytes: usize) {
        let c = &self.counters[slot(category)];
        c.packets.fetch_add(1, Ordering::Relaxed);
        // Release: a drain that sees these bytes also sees the packet
        c.bytes.fetch_add(bytes as u64, Ordering::Release);
    }

    /// Take and reset counters, converting them to metrics over `elapsed`
    ///
    /// Categories with no packets in the interval are omitted. Bytes are taken
    /// before packets, so a `record` racing the drain may have its packet
    /// counted in this interval and its bytes in the next, but never the
    /// reverse. Bytes left without a packet are carried into the next drain.
    pub fn drain(&self, elapsed: Duration) -> Vec<TrafficMetrics> {
        let secs = elapsed.as_secs_f64();
        let now = Utc::now();
        TrafficCategory::ALL
            .iter()
            .filter_map(|&category| {
                let c = &self.counters[slot(category)];
                let bytes = c.bytes.swap(0, Ordering::Acquire);
                let packets = c.packets.swap(0, Ordering::Relaxed);
                if packets == 0 {
                    if bytes > 0 {
                        c.bytes.fetch_add(bytes, Ordering::Relaxed);
                    }
                    return None;
                }
                let (packet_rate, throughput) = if secs > 0.0 {
                    (packets as f64 / secs, bytes as f64 * 8.0 / secs / 1_000_000.0)
                } else {
                    (0.0, 0.0)
                };
                Some(TrafficMetrics {
                    category,
                    packet_count: packets,
                    byte_count: bytes,
                    average_packet_size: bytes as f64 / packets as f64,
                    packet_rate,
                    current_throughput: throughput,
                    timestamp: now,
                })
            })
            .collect()
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame counters for the capture pipeline
#[derive(Default)]
pub struct CaptureStats {
    /// Frames read from the source
    pub received: AtomicU64,
    /// Frames parsed and classified
    pub processed: AtomicU64,
    /// Frames dropped as malformed
    pub malformed: AtomicU64,
}

impl CaptureStats {
    /// Point-in-time copy
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Capture counters (non-atomic)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStatsSnapshot {
    /// Frames read from the source
    pub received: u64,
    /// Frames parsed and classified
    pub processed: u64,
    /// Frames dropped as malformed
    pub malformed: u64,
}

//! Rolling throughput history
//!
//! One bounded window per tracked category, each behind its own lock so a
//! capture worker recording video never blocks a predictor reading voice.

use crate::category::TrafficCategory;
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Default samples kept per category
pub const HISTORY_CAPACITY: usize = 100;

/// Per-category throughput samples (Mbps), oldest first
pub struct MetricsHistory {
    capacity: usize,
    windows: [RwLock<VecDeque<f64>>; 4],
}

impl MetricsHistory {
    /// History holding up to `capacity` samples per category
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            windows: std::array::from_fn(|_| RwLock::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// Samples kept per category
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest once full
    ///
    /// Samples for `Unknown` are discarded. Returns whether the sample was kept.
    pub fn record(&self, category: TrafficCategory, throughput_mbps: f64) -> bool {
        let Some(idx) = category.tracked_index() else {
            return false;
        };
        let mut window = self.windows[idx].write();
        Self::push_bounded(&mut window, throughput_mbps, self.capacity);
        true
    }

    fn push_bounded(queue: &mut VecDeque<f64>, value: f64, capacity: usize) {
        while queue.len() >= capacity {
            queue.pop_front();
        }
        queue.push_back(value);
    }

    /// Most recent `n` samples, most-recent-last
    pub fn window(&self, category: TrafficCategory, n: usize) -> Vec<f64> {
        let Some(idx) = category.tracked_index() else {
            return Vec::new();
        };
        let window = self.windows[idx].read();
        let skip = window.len().saturating_sub(n);
        window.iter().skip(skip).copied().collect()
    }

    /// Number of samples held for `category`
    pub fn len(&self, category: TrafficCategory) -> usize {
        category
            .tracked_index()
            .map(|idx| self.windows[idx].read().len())
            .unwrap_or(0)
    }

    /// Whether `category` has no samples
    pub fn is_empty(&self, category: TrafficCategory) -> bool {
        self.len(category) == 0
    }

    /// Sample counts for every tracked category
    pub fn sizes(&self) -> Vec<(TrafficCategory, usize)> {
        TrafficCategory::TRACKED
            .iter()
            .map(|c| (*c, self.len(*c)))
            .collect()
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

/// Arithmetic mean, 0 for an empty slice
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population variance, 0 for fewer than two samples
pub fn variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let mean = mean(data);
    data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_eviction_keeps_most_recent() {
        let history = MetricsHistory::new(100);
        for i in 0..150 {
            history.record(TrafficCategory::Video, i as f64);
        }
        assert_eq!(history.len(TrafficCategory::Video), 100);
        assert_eq!(history.window(TrafficCategory::Video, 3), vec![147.0, 148.0, 149.0]);
        assert_eq!(history.window(TrafficCategory::Video, 1000)[0], 50.0);
    }

    #[test]
    fn test_unknown_discarded() {
        let history = MetricsHistory::default();
        assert!(!history.record(TrafficCategory::Unknown, 1.0));
        assert_eq!(history.len(TrafficCategory::Unknown), 0);
        assert!(history.window(TrafficCategory::Unknown, 5).is_empty());
    }

    #[test]
    fn test_short_window() {
        let history = MetricsHistory::default();
        history.record(TrafficCategory::Voice, 0.2);
        history.record(TrafficCategory::Voice, 0.3);
        assert_eq!(history.window(TrafficCategory::Voice, 5), vec![0.2, 0.3]);
        assert!(history.is_empty(TrafficCategory::File));
    }

    #[test]
    fn test_variance() {
        assert_eq!(variance(&[1.0]), 0.0);
        assert!((variance(&[1.0, 2.0, 3.0, 4.0, 5.0]) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_concurrent_record_never_exceeds_capacity() {
        let history = Arc::new(MetricsHistory::new(10));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let history = Arc::clone(&history);
                thread::spawn(move || {
                    for i in 0..500 {
                        history.record(TrafficCategory::TRACKED[t % 4], i as f64);
                        assert!(history.len(TrafficCategory::TRACKED[t % 4]) <= 10);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for (_, size) in history.sizes() {
            assert_eq!(size, 10);
        }
    }
}

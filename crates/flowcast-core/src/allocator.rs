//! Priority-based bandwidth allocation
//!
//! Two-pass greedy split of a capacity budget:
//!
//! 1. predictions sorted by category priority, highest first (stable)
//! 2. priority ≥ 2 gets `min(predicted × 1.2, remaining)` (20% headroom)
//! 3. everything else, same order, gets `min(predicted, remaining)`
//!
//! Every grant is capped by `remaining`, so the sum never exceeds the total
//! and `remaining` never goes negative.

use crate::category::{Priority, TrafficCategory};
use crate::predictor::{round_to, PredictionResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

/// Priority at or above which traffic gets headroom
pub const HEADROOM_PRIORITY: Priority = 2;

/// Headroom multiplier for latency-sensitive traffic
pub const HEADROOM_FACTOR: f64 = 1.2;

/// Outcome of one allocation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    /// Granted bandwidth per category (Mbps)
    pub allocations: BTreeMap<TrafficCategory, f64>,
    /// Budget the call was made against
    pub total_bandwidth: f64,
    /// Sum of grants
    pub total_allocated: f64,
    /// Budget left over
    pub remaining: f64,
    /// Percentage of the budget granted, 1 decimal
    pub utilization_percent: f64,
    /// When the allocation was computed
    pub timestamp: DateTime<Utc>,
}

/// Bandwidth allocator
///
/// Stateless between calls apart from the last result, kept for inspection.
#[derive(Default)]
pub struct BandwidthAllocator {
    last: RwLock<Option<AllocationResult>>,
}

#[inline]
fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

impl BandwidthAllocator {
    /// New allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `total_bandwidth` across the categories in `predictions`
    ///
    /// A negative or non-finite total is treated as 0, which grants nothing.
    /// A category listed twice is granted once, for its first entry.
    pub fn allocate(&self, predictions: &[PredictionResult], total_bandwidth: f64) -> AllocationResult {
        let total = sanitize(total_bandwidth);
        let mut allocations = BTreeMap::new();
        let mut remaining = total;

        if total > 0.0 {
            let mut sorted: Vec<&PredictionResult> = predictions.iter().collect();
            sorted.sort_by_key(|p| Reverse(p.category.default_priority()));

            // First pass: latency-sensitive traffic with headroom
            for p in &sorted {
                if p.category.default_priority() < HEADROOM_PRIORITY
                    || allocations.contains_key(&p.category)
                {
                    continue;
                }
                let granted = (sanitize(p.predicted_bandwidth_mbps) * HEADROOM_FACTOR).min(remaining);
                allocations.insert(p.category, granted);
                remaining = (remaining - granted).max(0.0);
            }

            // Second pass: the rest, without headroom
            for p in &sorted {
                if allocations.contains_key(&p.category) {
                    continue;
                }
                let granted = sanitize(p.predicted_bandwidth_mbps).min(remaining);
                allocations.insert(p.category, granted);
                remaining = (remaining - granted).max(0.0);
            }
        }

        let utilization_percent = if total > 0.0 {
            round_to((total - remaining) / total * 100.0, 1)
        } else {
            0.0
        };

        let result = AllocationResult {
            allocations,
            total_bandwidth: total,
            total_allocated: total - remaining,
            remaining,
            utilization_percent,
            timestamp: Utc::now(),
        };

        debug!(
            total = result.total_bandwidth,
            allocated = result.total_allocated,
            utilization = result.utilization_percent,
            categories = result.allocations.len(),
            "bandwidth allocated"
        );

        *self.last.write() = Some(result.clone());
        result
    }

    /// Result of the most recent call
    pub fn last(&self) -> Option<AllocationResult> {
        self.last.read().clone()
    }
}

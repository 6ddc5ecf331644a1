//! QoS decisioning
//!
//! One rule per category, upserted administratively. Each [`QosController::apply_qos`]
//! call is a pure function of the rule and the reported bandwidth:
//!
//! | condition              | action       | target      |
//! |------------------------|--------------|-------------|
//! | no rule                | `none`       | -           |
//! | current > max          | `throttle`   | max         |
//! | current < min          | `prioritize` | min         |
//! | otherwise (inclusive)  | `maintain`   | current     |
//!
//! Flow identity is tracked for reporting only.

use crate::category::{Priority, TrafficCategory, MAX_PRIORITY};
use crate::error::{FlowcastError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Largest 6-bit DSCP value
pub const MAX_MARKING: u8 = 63;

/// Bandwidth bounds and marking for one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QosRule {
    /// Floor in Mbps
    pub min_bandwidth: f64,
    /// Ceiling in Mbps
    pub max_bandwidth: f64,
    /// Priority 0-3
    pub priority: Priority,
    /// DSCP marking
    #[serde(alias = "dscp", default)]
    pub marking: u8,
}

impl QosRule {
    /// Build a rule (unvalidated)
    pub const fn new(min_bandwidth: f64, max_bandwidth: f64, priority: Priority, marking: u8) -> Self {
        Self {
            min_bandwidth,
            max_bandwidth,
            priority,
            marking,
        }
    }

    /// Check bounds, priority and marking
    pub fn validate(&self) -> Result<()> {
        if !self.min_bandwidth.is_finite() || !self.max_bandwidth.is_finite() {
            return Err(FlowcastError::invalid_rule("bandwidth bounds must be finite"));
        }
        if self.min_bandwidth < 0.0 {
            return Err(FlowcastError::invalid_rule(format!(
                "min bandwidth {} is negative",
                self.min_bandwidth
            )));
        }
        if self.min_bandwidth > self.max_bandwidth {
            return Err(FlowcastError::invalid_rule(format!(
                "min bandwidth {} exceeds max bandwidth {}",
                self.min_bandwidth, self.max_bandwidth
            )));
        }
        if self.priority > MAX_PRIORITY {
            return Err(FlowcastError::invalid_rule(format!(
                "priority {} outside 0-{MAX_PRIORITY}",
                self.priority
            )));
        }
        if self.marking > MAX_MARKING {
            return Err(FlowcastError::invalid_rule(format!(
                "marking {} exceeds {MAX_MARKING}",
                self.marking
            )));
        }
        Ok(())
    }
}

/// Seed rules installed at startup
pub fn default_rules() -> BTreeMap<TrafficCategory, QosRule> {
    BTreeMap::from([
        (TrafficCategory::Video, QosRule::new(5.0, 50.0, 3, 46)),
        (TrafficCategory::Voice, QosRule::new(0.1, 10.0, 3, 46)),
        (TrafficCategory::File, QosRule::new(0.5, 30.0, 1, 10)),
        (TrafficCategory::Background, QosRule::new(0.0, 20.0, 0, 0)),
    ])
}

/// Decided action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// No rule for the category
    None,
    /// Over the ceiling
    Throttle,
    /// Under the floor
    Prioritize,
    /// Within bounds
    Maintain,
}

impl Action {
    /// Lower-case name
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::None => "none",
            Action::Throttle => "throttle",
            Action::Prioritize => "prioritize",
            Action::Maintain => "maintain",
        }
    }
}

/// Why the action was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// No rule for the category
    NoRule,
    /// Current bandwidth above max
    ExceedsMax,
    /// Current bandwidth below min
    BelowMin,
    /// Current bandwidth within [min, max]
    WithinLimits,
}

/// Per-flow QoS decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QosAction {
    /// What to do
    pub action: Action,
    /// Bandwidth to steer toward, absent for `none`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_bandwidth: Option<f64>,
    /// Why
    pub reason: Reason,
    /// Marking to apply, absent for `none`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marking: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
struct FlowState {
    action: Action,
    last_seen: Instant,
}

/// Rule table plus flow bookkeeping
pub struct QosController {
    rules: DashMap<TrafficCategory, QosRule>,
    flows: DashMap<String, FlowState>,
}

impl QosController {
    /// Controller with no rules
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
            flows: DashMap::new(),
        }
    }

    /// Controller seeded with `rules`, each validated
    pub fn with_rules<I>(rules: I) -> Result<Self>
    where
        I: IntoIterator<Item = (TrafficCategory, QosRule)>,
    {
        let controller = Self::new();
        for (category, rule) in rules {
            controller.set_rule(category, rule)?;
        }
        Ok(controller)
    }

    /// Insert or replace the rule for `category`
    ///
    /// On rejection any existing rule is kept.
    pub fn set_rule(&self, category: TrafficCategory, rule: QosRule) -> Result<()> {
        if let Err(e) = rule.validate() {
            warn!(%category, error = %e, "qos rule rejected");
            return Err(e);
        }
        self.rules.insert(category, rule);
        info!(
            %category,
            min = rule.min_bandwidth,
            max = rule.max_bandwidth,
            priority = rule.priority,
            marking = rule.marking,
            "qos rule set"
        );
        Ok(())
    }

    /// Rule for `category`
    pub fn rule(&self, category: TrafficCategory) -> Option<QosRule> {
        self.rules.get(&category).map(|r| *r)
    }

    /// All rules
    pub fn rules(&self) -> BTreeMap<TrafficCategory, QosRule> {
        self.rules.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    /// Number of rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Decide the action for a flow
    pub fn apply_qos(&self, flow_id: &str, category: TrafficCategory, current_bandwidth: f64) -> QosAction {
        let action = match self.rule(category) {
            None => QosAction {
                action: Action::None,
                target_bandwidth: None,
                reason: Reason::NoRule,
                marking: None,
            },
            Some(rule) => Self::decide(&rule, current_bandwidth),
        };

        self.flows.insert(
            flow_id.to_string(),
            FlowState {
                action: action.action,
                last_seen: Instant::now(),
            },
        );
        action
    }

    fn decide(rule: &QosRule, current: f64) -> QosAction {
        let marking = Some(rule.marking);
        if current > rule.max_bandwidth {
            QosAction {
                action: Action::Throttle,
                target_bandwidth: Some(rule.max_bandwidth),
                reason: Reason::ExceedsMax,
                marking,
            }
        } else if current < rule.min_bandwidth {
            QosAction {
                action: Action::Prioritize,
                target_bandwidth: Some(rule.min_bandwidth),
                reason: Reason::BelowMin,
                marking,
            }
        } else {
            QosAction {
                action: Action::Maintain,
                target_bandwidth: Some(current),
                reason: Reason::WithinLimits,
                marking,
            }
        }
    }

    /// Flows seen since the last prune
    pub fn active_flows(&self) -> usize {
        self.flows.len()
    }

    /// Flow count per last action
    pub fn flow_actions(&self) -> BTreeMap<Action, usize> {
        let mut counts = BTreeMap::new();
        for flow in self.flows.iter() {
            *counts.entry(flow.action).or_insert(0) += 1;
        }
        counts
    }

    /// Drop flows idle for longer than `idle`; returns how many were dropped
    pub fn prune_flows(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.flows.len();
        self.flows
            .retain(|_, state| now.saturating_duration_since(state.last_seen) <= idle);
        before.saturating_sub(self.flows.len())
    }
}

impl Default for QosController {
    fn default() -> Self {
        Self::new()
    }
}

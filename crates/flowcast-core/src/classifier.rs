//! Traffic classifier
//!
//! Port-first classification against a static rule table:
//!
//! 1. destination port, scanning categories in fixed order
//! 2. source port, same scan
//! 3. protocol number fallback: TCP → file/1, UDP → voice/2, else unknown/0
//!
//! Scan order is [`TrafficCategory::TRACKED`] (video, voice, file,
//! background). A port listed under two categories resolves to the earlier
//! one.
//!
//! The UDP → voice fallback biases arbitrary UDP traffic upward. Downstream
//! allocation relies on it, so it is kept as-is.

use crate::category::{Priority, TrafficCategory};
use crate::error::{FlowcastError, Result};
use crate::packet::{ParsedPacket, IPPROTO_TCP, IPPROTO_UDP};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Category and priority assigned to a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Traffic category
    pub category: TrafficCategory,
    /// Priority 0-3
    pub priority: Priority,
}

impl Classification {
    /// Category with its default priority
    pub const fn of(category: TrafficCategory) -> Self {
        Self {
            category,
            priority: category.default_priority(),
        }
    }

    /// Unclassifiable traffic
    pub const UNKNOWN: Self = Self {
        category: TrafficCategory::Unknown,
        priority: 0,
    };
}

/// Ports and protocol identifiers for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Category this rule matches
    pub category: TrafficCategory,
    /// Well-known ports
    pub ports: BTreeSet<u16>,
    /// Application protocol identifiers (e.g. "rtmp", "sip")
    pub protocols: Vec<String>,
}

impl ClassificationRule {
    fn new(category: TrafficCategory, ports: &[u16], protocols: &[&str]) -> Self {
        Self {
            category,
            ports: ports.iter().copied().collect(),
            protocols: protocols.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Whether `port` is one of this rule's ports
    #[inline]
    pub fn matches_port(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }
}

/// Built-in rule table, in scan order
pub fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(
            TrafficCategory::Video,
            &[
                1935, 3478, 3479, 5004, 5005, 8554, 1755, 6970, 6971, 6972, 6973, 6974, 6975,
                6976, 6977, 6978, 6979,
            ],
            &["rtmp", "rtp", "rtsp"],
        ),
        ClassificationRule::new(
            TrafficCategory::Voice,
            &[
                5060, 5061, 5062, 16384, 16385, 16386, 16387, 16388, 16389, 16390, 16391, 16392,
                16393, 16394, 16395, 16396,
            ],
            &["sip", "rtp"],
        ),
        ClassificationRule::new(
            TrafficCategory::File,
            &[20, 21, 22, 25, 110, 143, 445, 3389, 8080, 8443],
            &["ftp", "sftp", "smtp", "pop3", "imap", "smb", "http", "https"],
        ),
        ClassificationRule::new(
            TrafficCategory::Background,
            &[53, 123, 161, 162, 389, 636, 3306, 5432],
            &["dns", "ntp", "snmp", "ldap", "mysql", "postgresql"],
        ),
    ]
}

/// Rule-table classifier
///
/// Reads are lock-free; administrative updates swap the whole table.
pub struct TrafficClassifier {
    rules: ArcSwap<Vec<ClassificationRule>>,
}

impl TrafficClassifier {
    /// Classifier with the built-in rule table
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(default_rules()),
        }
    }

    /// Classify a parsed packet
    pub fn classify(&self, packet: &ParsedPacket) -> Classification {
        if !packet.is_ipv4() {
            return Classification::UNKNOWN;
        }

        let rules = self.rules.load();
        if let Some(port) = packet.destination_port {
            if let Some(found) = Self::scan(&rules, port) {
                return found;
            }
        }
        if let Some(port) = packet.source_port {
            if let Some(found) = Self::scan(&rules, port) {
                return found;
            }
        }

        match packet.protocol {
            Some(IPPROTO_TCP) => Classification {
                category: TrafficCategory::File,
                priority: 1,
            },
            Some(IPPROTO_UDP) => Classification {
                category: TrafficCategory::Voice,
                priority: 2,
            },
            _ => Classification::UNKNOWN,
        }
    }

    /// Classify and stamp the result onto the packet
    pub fn classify_into(&self, packet: &mut ParsedPacket) -> Classification {
        let class = self.classify(packet);
        packet.category = class.category;
        packet.priority = class.priority;
        class
    }

    #[inline]
    fn scan(rules: &[ClassificationRule], port: u16) -> Option<Classification> {
        rules
            .iter()
            .find(|rule| rule.matches_port(port))
            .map(|rule| Classification::of(rule.category))
    }

    /// Replace one category's ports and protocol identifiers
    ///
    /// Scan order is unaffected. `Unknown` has no rule.
    pub fn set_rule(&self, rule: ClassificationRule) -> Result<()> {
        if rule.category.tracked_index().is_none() {
            return Err(FlowcastError::invalid_rule(
                "unknown traffic has no classification rule",
            ));
        }

        self.rules.rcu(|current| {
            let mut next = (**current).clone();
            if let Some(slot) = next.iter_mut().find(|r| r.category == rule.category) {
                *slot = rule.clone();
            }
            next
        });
        tracing::info!(category = %rule.category, ports = rule.ports.len(), "classification rule updated");
        Ok(())
    }

    /// Current rule table, in scan order
    pub fn rules(&self) -> Arc<Vec<ClassificationRule>> {
        self.rules.load_full()
    }
}

impl Default for TrafficClassifier {
    fn default() -> Self {
        Self::new()
    }
}

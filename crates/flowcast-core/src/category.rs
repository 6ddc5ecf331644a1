//! Traffic categories
//!
//! Closed set of categories every flow is classified into. Declaration order
//! of [`TrafficCategory::TRACKED`] is also the classifier's scan order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Priority level (0 = lowest, 3 = highest)
pub type Priority = u8;

/// Highest valid priority
pub const MAX_PRIORITY: Priority = 3;

/// Traffic category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficCategory {
    /// Streaming and real-time video
    Video,
    /// VoIP and signalling
    Voice,
    /// File transfer, mail, remote desktop
    File,
    /// DNS, NTP, directory and database chatter
    Background,
    /// Anything else
    Unknown,
}

impl Default for TrafficCategory {
    fn default() -> Self {
        Self::Unknown
    }
}

impl TrafficCategory {
    /// Categories that keep throughput history, in scan order
    pub const TRACKED: [TrafficCategory; 4] = [
        TrafficCategory::Video,
        TrafficCategory::Voice,
        TrafficCategory::File,
        TrafficCategory::Background,
    ];

    /// All categories including `Unknown`
    pub const ALL: [TrafficCategory; 5] = [
        TrafficCategory::Video,
        TrafficCategory::Voice,
        TrafficCategory::File,
        TrafficCategory::Background,
        TrafficCategory::Unknown,
    ];

    /// Fixed default priority
    pub const fn default_priority(self) -> Priority {
        match self {
            TrafficCategory::Video | TrafficCategory::Voice => 3,
            TrafficCategory::File => 1,
            TrafficCategory::Background | TrafficCategory::Unknown => 0,
        }
    }

    /// Base bandwidth (Mbps) used by the heuristic estimator
    pub const fn base_bandwidth_mbps(self) -> f64 {
        match self {
            TrafficCategory::Video => 5.0,
            TrafficCategory::Voice => 0.1,
            TrafficCategory::File => 2.0,
            TrafficCategory::Background => 0.5,
            TrafficCategory::Unknown => 1.0,
        }
    }

    /// Slot in per-category tables, `None` for untracked traffic
    pub const fn tracked_index(self) -> Option<usize> {
        match self {
            TrafficCategory::Video => Some(0),
            TrafficCategory::Voice => Some(1),
            TrafficCategory::File => Some(2),
            TrafficCategory::Background => Some(3),
            TrafficCategory::Unknown => None,
        }
    }

    /// Lower-case name
    pub const fn as_str(self) -> &'static str {
        match self {
            TrafficCategory::Video => "video",
            TrafficCategory::Voice => "voice",
            TrafficCategory::File => "file",
            TrafficCategory::Background => "background",
            TrafficCategory::Unknown => "unknown",
        }
    }

    /// Parse a request-supplied name, mapping anything unrecognised to `Unknown`
    pub fn from_name_lossy(name: &str) -> Self {
        name.parse().unwrap_or(TrafficCategory::Unknown)
    }
}

impl fmt::Display for TrafficCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(TrafficCategory::Video),
            "voice" => Ok(TrafficCategory::Voice),
            "file" => Ok(TrafficCategory::File),
            "background" => Ok(TrafficCategory::Background),
            "unknown" => Ok(TrafficCategory::Unknown),
            other => Err(format!("unknown traffic category: {other}")),
        }
    }
}

/// Serde adapter accepting any string, mapping unrecognised names to `Unknown`
pub fn deserialize_lossy<'de, D>(deserializer: D) -> Result<TrafficCategory, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(TrafficCategory::from_name_lossy(&name))
}

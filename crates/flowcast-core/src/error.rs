//! Error types for Flowcast

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Header layer being decoded when a frame turned out to be too short
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Link layer (14 bytes)
    Ethernet,
    /// Network layer (20 to 60 bytes)
    Ipv4,
    /// TCP fixed portion (14 bytes)
    Tcp,
    /// UDP header (8 bytes)
    Udp,
    /// ICMP type/code/checksum (4 bytes)
    Icmp,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Ethernet => "ethernet",
            Layer::Ipv4 => "ipv4",
            Layer::Tcp => "tcp",
            Layer::Udp => "udp",
            Layer::Icmp => "icmp",
        };
        f.write_str(name)
    }
}

/// Flowcast error type
#[derive(Error, Debug)]
pub enum FlowcastError {
    /// Buffer too short for the header being decoded
    #[error("malformed frame: {layer} header needs {needed} bytes, got {actual}")]
    MalformedFrame {
        /// Layer being decoded
        layer: Layer,
        /// Bytes required
        needed: usize,
        /// Bytes available
        actual: usize,
    },

    /// QoS rule rejected on insert
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Pluggable estimator failed or timed out
    #[error("estimation strategy failed: {0}")]
    EstimationStrategy(String),

    /// Frame source failure
    #[error("capture error: {0}")]
    Capture(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowcastError {
    /// Frame too short for `layer`
    pub fn malformed(layer: Layer, needed: usize, actual: usize) -> Self {
        FlowcastError::MalformedFrame { layer, needed, actual }
    }

    /// Rule rejected with a reason
    pub fn invalid_rule<S: Into<String>>(reason: S) -> Self {
        FlowcastError::InvalidRule(reason.into())
    }
}

/// Result type for Flowcast
pub type Result<T> = std::result::Result<T, FlowcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_message() {
        let err = FlowcastError::malformed(Layer::Ethernet, 14, 3);
        assert_eq!(
            err.to_string(),
            "malformed frame: ethernet header needs 14 bytes, got 3"
        );
    }
}

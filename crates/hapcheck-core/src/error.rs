//! Fault taxonomy for probes.
//!
//! Every variant is caught at the probe boundary and turned into a failed
//! [`ProbeOutcome`](crate::outcome::ProbeOutcome); none escapes to the driver.

use dnssd_browser::DiscoveryError;
use thiserror::Error;

/// Faults a probe can hit while checking the bridge.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Connection refused, reset or timed out.
    #[error("connectivity fault: {0}")]
    Connectivity(String),

    /// The peer answered, but not the way the protocol requires.
    #[error("protocol fault: {0}")]
    Protocol(String),

    /// The discovery browser was unavailable or produced nothing usable.
    #[error("discovery fault: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Anything unanticipated, including a panic inside a probe.
    #[error("internal fault: {0}")]
    Internal(String),
}

impl ProbeError {
    /// Short machine-readable tag for logs and JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Connectivity(_) => "connectivity",
            ProbeError::Protocol(_) => "protocol",
            ProbeError::Discovery(_) => "discovery",
            ProbeError::Internal(_) => "internal",
        }
    }

    /// Classify a `reqwest` failure.
    pub fn from_http(url: &str, err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ProbeError::Connectivity(format!("cannot reach {}: {}", url, describe_chain(&err)))
        } else if err.is_decode() || err.is_body() {
            ProbeError::Protocol(format!("malformed response from {}: {}", url, describe_chain(&err)))
        } else {
            ProbeError::Internal(format!("request to {} failed: {}", url, describe_chain(&err)))
        }
    }
}

/// Render an error and its sources on one line.
pub(crate) fn describe_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !msg.contains(&text) {
            msg.push_str(": ");
            msg.push_str(&text);
        }
        source = inner.source();
    }
    msg
}

/// Convenience result alias.
pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

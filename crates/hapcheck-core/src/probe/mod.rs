//! Probes: one check each against a running bridge.
//!
//! A probe is a pure function of `(target, timeout)` to a [`ProbeOutcome`].
//! Faults never escape `run`; they are folded into a failed outcome with a
//! readable detail.

pub mod advertisement;
pub mod api;
pub mod challenge;
pub mod tcp;

use crate::config::ConnectionTarget;
use crate::outcome::ProbeOutcome;
use async_trait::async_trait;
use std::time::Duration;

pub use advertisement::AdvertisementProbe;
pub use api::ApiShapeProbe;
pub use challenge::ChallengeProbe;
pub use tcp::TcpReachabilityProbe;

/// Stable probe names used in logs, reports and verdict policies.
pub mod names {
    pub const TCP_CONNECTION: &str = "tcp_connection";
    pub const HAP_CHALLENGE: &str = "hap_challenge";
    pub const WEB_API: &str = "web_api";
    pub const MDNS_ADVERTISEMENT: &str = "mdns_advertisement";
}

/// A single verification against the bridge.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Stable identifier, unique within a probe set.
    fn name(&self) -> &str;

    /// Human-readable title for the log stream.
    fn title(&self) -> &str;

    /// Run the check. Must return within roughly `timeout` and never panic
    /// on network or process faults.
    async fn run(&self, target: &ConnectionTarget, timeout: Duration) -> ProbeOutcome;
}

/// Shared HTTP client settings for the HTTP-based probes.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, crate::error::ProbeError> {
    reqwest::Client::builder()
        .user_agent(concat!("hapcheck/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .map_err(|e| crate::error::ProbeError::Internal(format!("cannot build HTTP client: {}", e)))
}

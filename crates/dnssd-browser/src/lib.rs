//! dnssd-browser: bounded DNS-SD observation through platform tools
//!
//! This crate wraps the service-discovery browsers that ship with each
//! platform behind one capability: observe the records of service type `T`
//! within window `W`.
//!
//! - macOS and Windows (Bonjour): `dns-sd`
//! - Linux and other Unix: `avahi-browse`
//!
//! Browsers stream until killed. Every invocation is bounded by a window,
//! killed when it elapses, and its partial output parsed into an
//! [`Observation`].

pub mod avahi;
pub mod dns_sd;
pub mod error;
pub mod fakes;
pub mod observation;
pub mod process;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

pub use avahi::AvahiBrowser;
pub use dns_sd::DnsSdBrowser;
pub use error::DiscoveryError;
pub use observation::{
    unescape_label, DiscoveryQuery, Observation, ObservedInstance, HAP_SERVICE_TYPE, LOCAL_DOMAIN,
};

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Observe DNS-SD records for a service type within a bounded window.
#[async_trait]
pub trait DiscoveryBrowser: Send + Sync {
    /// Short name of the strategy, for logs.
    fn name(&self) -> &'static str;

    /// Browse `query.service_type` for at most `window` and resolve instances
    /// matching `query.instance_pattern`. A window elapsing is not an error.
    ///
    /// No step starts or runs past `deadline`. When it is reached, whatever
    /// was observed so far is returned.
    async fn observe(
        &self,
        query: &DiscoveryQuery,
        window: Duration,
        deadline: Instant,
    ) -> Result<Observation>;
}

/// Which platform tool to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserKind {
    DnsSd,
    Avahi,
}

impl BrowserKind {
    /// Pick the browser for an OS name as reported by `std::env::consts::OS`.
    pub fn for_os(os: &str) -> Self {
        match os {
            "macos" | "ios" | "windows" => BrowserKind::DnsSd,
            _ => BrowserKind::Avahi,
        }
    }

    /// Browser for the host this process runs on.
    pub fn for_host() -> Self {
        Self::for_os(std::env::consts::OS)
    }

    pub fn program(&self) -> &'static str {
        match self {
            BrowserKind::DnsSd => "dns-sd",
            BrowserKind::Avahi => "avahi-browse",
        }
    }

    /// Build the strategy. `resolve_window` bounds each per-instance lookup
    /// for browsers that resolve in a separate step.
    pub fn build(&self, resolve_window: Duration) -> Box<dyn DiscoveryBrowser> {
        match self {
            BrowserKind::DnsSd => Box::new(DnsSdBrowser::new(resolve_window)),
            BrowserKind::Avahi => Box::new(AvahiBrowser::new()),
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "dns-sd" | "dnssd" => Ok(BrowserKind::DnsSd),
            "avahi" | "avahi-browse" => Ok(BrowserKind::Avahi),
            other => Err(format!(
                "unknown discovery browser '{}' (expected dns-sd or avahi)",
                other
            )),
        }
    }
}

impl std::fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program())
    }
}

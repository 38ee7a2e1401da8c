//! Check configuration, resolved once at startup and passed explicitly.

use dnssd_browser::{BrowserKind, HAP_SERVICE_TYPE, LOCAL_DOMAIN};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default HAP accessory server port (HAP-NodeJS).
pub const DEFAULT_HAP_PORT: u16 = 51826;

/// Default port of the bridge's companion web application.
pub const DEFAULT_WEB_PORT: u16 = 3000;

/// Default instance name advertised by the bridge. HAP-NodeJS appends a
/// short suffix derived from the MAC address, hence the optional word.
pub const DEFAULT_INSTANCE_PATTERN: &str = r"SmartThings Bridge( \w+)?";

/// Margin kept between a discovery window and the probe budget.
const WINDOW_MARGIN: Duration = Duration::from_millis(250);

/// Where the bridge lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    /// Host running the bridge (usually loopback)
    pub host: String,
    /// HAP accessory server port
    pub hap_port: u16,
    /// Companion HTTP application port
    pub web_port: u16,
}

impl Default for ConnectionTarget {
    fn default() -> Self {
        ConnectionTarget {
            host: "localhost".to_string(),
            hap_port: DEFAULT_HAP_PORT,
            web_port: DEFAULT_WEB_PORT,
        }
    }
}

impl ConnectionTarget {
    pub fn new(host: &str, hap_port: u16, web_port: u16) -> Self {
        Self {
            host: host.to_string(),
            hap_port,
            web_port,
        }
    }

    /// Base URL of the HAP server.
    pub fn hap_url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.hap_port, path)
    }

    /// Base URL of the companion web application.
    pub fn web_url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.web_port, path)
    }
}

/// How the advertisement check browses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Service type to browse
    pub service_type: String,
    /// Browse domain
    pub domain: String,
    /// Regular expression the full instance name must match
    pub instance_pattern: String,
    /// How long the browse step may run
    pub browse_window: Duration,
    /// How long each resolution step may run
    pub resolve_window: Duration,
    /// Force a browser instead of picking one for the host OS
    pub browser: Option<BrowserKind>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            service_type: HAP_SERVICE_TYPE.to_string(),
            domain: LOCAL_DOMAIN.to_string(),
            instance_pattern: DEFAULT_INSTANCE_PATTERN.to_string(),
            browse_window: Duration::from_secs(3),
            resolve_window: Duration::from_secs(2),
            browser: None,
        }
    }
}

impl DiscoveryConfig {
    /// Browser to use on this host.
    pub fn browser_kind(&self) -> BrowserKind {
        self.browser.unwrap_or_else(BrowserKind::for_host)
    }
}

/// Complete configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    pub target: ConnectionTarget,
    /// Per-probe budget
    pub timeout: Duration,
    /// Pause before the first probe so a freshly started server can settle
    pub settle: Duration,
    pub discovery: DiscoveryConfig,
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig {
            target: ConnectionTarget::default(),
            timeout: Duration::from_secs(10),
            settle: Duration::from_secs(2),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl CheckConfig {
    /// Defaults overridden by `HAPCHECK_HOST`, `HAPCHECK_HAP_PORT` and
    /// `HAPCHECK_WEB_PORT`. Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("HAPCHECK_HOST") {
            config.target.host = host;
        }
        if let Some(port) = env_port("HAPCHECK_HAP_PORT") {
            config.target.hap_port = port;
        }
        if let Some(port) = env_port("HAPCHECK_WEB_PORT") {
            config.target.web_port = port;
        }
        config
    }

    pub fn with_target(mut self, target: ConnectionTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = discovery;
        self
    }

    /// Browse window, clamped strictly below the probe budget.
    pub fn effective_browse_window(&self) -> Duration {
        clamp_window(self.discovery.browse_window, self.timeout)
    }

    /// Resolve window, clamped so browse plus resolve stays inside the budget.
    pub fn effective_resolve_window(&self) -> Duration {
        let left = self.timeout.saturating_sub(self.effective_browse_window());
        clamp_window(self.discovery.resolve_window, left)
    }
}

fn clamp_window(window: Duration, budget: Duration) -> Duration {
    let ceiling = budget.saturating_sub(WINDOW_MARGIN).max(budget / 2);
    window.min(ceiling)
}

fn env_port(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

//! mDNS / DNS-SD advertisement of the bridge.

use super::{names, Probe};
use crate::config::{CheckConfig, ConnectionTarget};
use crate::error::ProbeResult;
use crate::outcome::ProbeOutcome;
use async_trait::async_trait;
use dnssd_browser::{DiscoveryBrowser, DiscoveryQuery, Observation};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Time kept back from the browser for killing its last process.
const REAP_SLACK: Duration = Duration::from_millis(750);

/// Checks the bridge is advertised under the expected instance name and that
/// the advertisement points at the HAP port.
pub struct AdvertisementProbe {
    browser: Arc<dyn DiscoveryBrowser>,
    query: DiscoveryQuery,
    browse_window: Duration,
}

impl std::fmt::Debug for AdvertisementProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvertisementProbe")
            .field("browser", &self.browser.name())
            .field("query", &self.query)
            .field("browse_window", &self.browse_window)
            .finish()
    }
}

impl AdvertisementProbe {
    pub fn new(
        browser: Arc<dyn DiscoveryBrowser>,
        query: DiscoveryQuery,
        browse_window: Duration,
    ) -> Self {
        Self {
            browser,
            query,
            browse_window,
        }
    }

    /// Probe using the browser for this host (or the configured override).
    pub fn from_config(config: &CheckConfig) -> ProbeResult<Self> {
        let discovery = &config.discovery;
        let query = DiscoveryQuery::new(
            &discovery.service_type,
            &discovery.domain,
            &discovery.instance_pattern,
        )?;
        let browser = discovery
            .browser_kind()
            .build(config.effective_resolve_window());
        Ok(Self::new(
            Arc::from(browser),
            query,
            config.effective_browse_window(),
        ))
    }

    async fn check(&self, target: &ConnectionTarget, timeout: Duration) -> ProbeResult<ProbeOutcome> {
        let budget = browser_budget(timeout);
        let deadline = Instant::now() + budget;
        let window = self.browse_window.min(budget);
        let query = self.query.clone().with_expected_port(target.hap_port);
        info!(
            browser = self.browser.name(),
            service_type = %query.service_type,
            window_ms = window.as_millis() as u64,
            budget_ms = budget.as_millis() as u64,
            "browsing for advertisement"
        );

        let observation =
            match tokio::time::timeout(timeout, self.browser.observe(&query, window, deadline)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(browser = self.browser.name(), "browser ignored its deadline");
                    return Ok(ProbeOutcome::inconclusive(format!(
                        "{} returned no observation within {:?}",
                        self.browser.name(),
                        timeout
                    )));
                }
            };

        debug!(instances = observation.instances.len(), window_elapsed = observation.window_elapsed, "observation complete");
        Ok(evaluate(&observation, &query, target.hap_port))
    }
}

/// Share of the probe budget the browser may use. The rest covers killing
/// and reaping the last browser process.
fn browser_budget(timeout: Duration) -> Duration {
    if timeout > REAP_SLACK * 2 {
        timeout - REAP_SLACK
    } else {
        timeout / 2
    }
}

/// Decide the outcome from what the browser saw.
///
/// Nothing of the service type at all is a hard failure. Seeing the type
/// without a resolved matching instance is inconclusive, since resolution
/// may simply have needed a longer window. A matching instance on a
/// different port is a hard failure.
pub fn evaluate(observation: &Observation, query: &DiscoveryQuery, expected_port: u16) -> ProbeOutcome {
    let matching: Vec<_> = observation.matching(query).collect();

    if matching.is_empty() {
        if !observation.service_type_seen() {
            return ProbeOutcome::fail(format!(
                "no service of type {} observed by {}",
                query.service_type, observation.browser
            ));
        }
        let seen: Vec<&str> = observation.instances.iter().map(|i| i.name.as_str()).collect();
        return ProbeOutcome::inconclusive(format!(
            "service present but instance unresolved: {} instance(s) of {} seen ({}), none matching the bridge name",
            seen.len(),
            query.service_type,
            seen.join(", ")
        ));
    }

    if let Some(hit) = matching.iter().find(|i| i.port == Some(expected_port)) {
        return ProbeOutcome::pass(format!(
            "'{}' advertised on port {} via {}",
            hit.name, expected_port, observation.browser
        ));
    }

    if let Some(wrong) = matching.iter().find(|i| i.is_resolved()) {
        return ProbeOutcome::fail(format!(
            "instance '{}' resolved to wrong port {} (expected {})",
            wrong.name,
            wrong.port.unwrap_or_default(),
            expected_port
        ));
    }

    let unresolved: Vec<&str> = matching.iter().map(|i| i.name.as_str()).collect();
    ProbeOutcome::inconclusive(format!(
        "service present but instance unresolved: {} did not resolve to a port",
        unresolved.join(", ")
    ))
}

#[async_trait]
impl Probe for AdvertisementProbe {
    fn name(&self) -> &str {
        names::MDNS_ADVERTISEMENT
    }

    fn title(&self) -> &str {
        "mDNS advertisement"
    }

    async fn run(&self, target: &ConnectionTarget, timeout: Duration) -> ProbeOutcome {
        self.check(target, timeout).await.into()
    }
}

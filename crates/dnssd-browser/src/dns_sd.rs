//! Apple `dns-sd` strategy (macOS, and Windows with Bonjour installed).
//!
//! Browsing happens in up to three steps:
//! 1. `dns-sd -B <type> <domain>` lists instance names
//! 2. `dns-sd -L <instance> <type> <domain>` resolves a matching instance
//! 3. `dns-sd -q <instance>.<type>.<domain> SRV` as a fallback when step 2
//!    did not report a port
//!
//! Instances are resolved one at a time until one reports the expected port
//! or the caller's deadline is reached.

use crate::error::DiscoveryError;
use crate::observation::{unescape_label, DiscoveryQuery, Observation, ObservedInstance};
use crate::process::{capture, step_window};
use crate::DiscoveryBrowser;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const PROGRAM: &str = "dns-sd";

/// One line of `dns-sd -B` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseRecord {
    /// `true` for `Add`, `false` for `Rmv`
    pub added: bool,
    pub service_type: String,
    pub instance: String,
}

/// Host and port reported by `dns-sd -L` or an SRV answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub host: String,
    pub port: u16,
}

fn browse_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\S+\s+(Add|Rmv)\s+\d+\s+\d+\s+\S+\s+(\S+)\s+(.+?)\s*$")
            .expect("static regex")
    })
}

fn reached_at() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"can be reached at (\S+?):(\d+)\b").expect("static regex")
    })
}

fn srv_answer() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\sSRV\s+IN\s+\d+\s+\d+\s+(\d+)\s+(\S+)").expect("static regex")
    })
}

/// Parse `dns-sd -B` output into add/remove records.
///
/// Header lines (including the `Browsing for _hap._tcp` banner) are ignored,
/// so a banner alone never counts as a sighting.
pub fn parse_browse_output(output: &str) -> Vec<BrowseRecord> {
    output
        .lines()
        .filter_map(|line| {
            let caps = browse_line().captures(line)?;
            Some(BrowseRecord {
                added: &caps[1] == "Add",
                service_type: caps[2].to_string(),
                instance: unescape_label(&caps[3]),
            })
        })
        .collect()
}

/// Parse `dns-sd -L` output for the first "can be reached at host:port" line.
pub fn parse_lookup_output(output: &str) -> Option<Resolution> {
    output.lines().find_map(|line| {
        let caps = reached_at().captures(line)?;
        let port = caps[2].parse().ok()?;
        Some(Resolution {
            host: caps[1].to_string(),
            port,
        })
    })
}

/// Parse `dns-sd -q <name> SRV` output for the first SRV answer.
pub fn parse_srv_output(output: &str) -> Option<Resolution> {
    output.lines().find_map(|line| {
        let caps = srv_answer().captures(line)?;
        let port = caps[1].parse().ok()?;
        Some(Resolution {
            host: caps[2].to_string(),
            port,
        })
    })
}

fn service_type_matches(reported: &str, wanted: &str) -> bool {
    reported.trim_end_matches('.') == wanted.trim_end_matches('.')
}

/// `dns-sd` based browser.
#[derive(Debug, Clone)]
pub struct DnsSdBrowser {
    /// Window for each `-L` or `-q` resolution step
    pub resolve_window: Duration,
    program: String,
}

impl DnsSdBrowser {
    pub fn new(resolve_window: Duration) -> Self {
        Self {
            resolve_window,
            program: PROGRAM.to_string(),
        }
    }

    /// Run a different executable instead of `dns-sd` from `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    async fn resolve(
        &self,
        instance: &str,
        query: &DiscoveryQuery,
        deadline: Instant,
    ) -> Result<Option<Resolution>, DiscoveryError> {
        let Some(window) = step_window(self.resolve_window, deadline) else {
            return Ok(None);
        };
        let lookup = capture(
            &self.program,
            &["-L", instance, &query.service_type, &query.domain],
            window,
        )
        .await?;
        if let Some(resolution) = parse_lookup_output(&lookup.stdout) {
            return Ok(Some(resolution));
        }

        let Some(window) = step_window(self.resolve_window, deadline) else {
            return Ok(None);
        };
        debug!(instance = %instance, "lookup gave no port, falling back to SRV query");
        let fqdn = format!(
            "{}.{}.{}",
            instance,
            query.service_type.trim_end_matches('.'),
            query.domain.trim_end_matches('.')
        );
        let srv = capture(&self.program, &["-q", &fqdn, "SRV"], window).await?;
        Ok(parse_srv_output(&srv.stdout))
    }
}

#[async_trait]
impl DiscoveryBrowser for DnsSdBrowser {
    fn name(&self) -> &'static str {
        PROGRAM
    }

    async fn observe(
        &self,
        query: &DiscoveryQuery,
        window: Duration,
        deadline: Instant,
    ) -> Result<Observation, DiscoveryError> {
        let mut observation = Observation::new(PROGRAM);
        let Some(window) = step_window(window, deadline) else {
            observation.window_elapsed = true;
            return Ok(observation);
        };

        let browse = capture(
            &self.program,
            &["-B", &query.service_type, &query.domain],
            window,
        )
        .await?;
        observation.window_elapsed = browse.timed_out;

        for record in parse_browse_output(&browse.stdout) {
            if !service_type_matches(&record.service_type, &query.service_type) {
                continue;
            }
            if record.added {
                observation.record(ObservedInstance::browsed(record.instance));
            } else {
                observation.remove(&record.instance);
            }
        }

        let candidates: Vec<String> = observation
            .matching(query)
            .map(|i| i.name.clone())
            .collect();
        let total = candidates.len();

        for (index, name) in candidates.into_iter().enumerate() {
            if observation.found_expected(query) {
                debug!(skipped = total - index, "expected port already found, not resolving the rest");
                break;
            }
            if step_window(self.resolve_window, deadline).is_none() {
                warn!(unresolved = total - index, "discovery deadline reached before all instances resolved");
                break;
            }

            info!(instance = %name, "found bridge instance, resolving");
            match self.resolve(&name, query, deadline).await {
                Ok(Some(resolution)) => {
                    observation.record(ObservedInstance::resolved(
                        name,
                        resolution.host,
                        resolution.port,
                    ));
                }
                Ok(None) => debug!(instance = %name, "instance did not resolve in window"),
                Err(e) => warn!(instance = %name, error = %e, "instance resolution failed"),
            }
        }

        Ok(observation)
    }
}

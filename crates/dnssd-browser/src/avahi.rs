//! `avahi-browse` strategy (Linux and other Unix hosts).
//!
//! `avahi-browse -p -t -r <type>` dumps its cache in parsable form and
//! resolves each instance, so a single invocation yields both sightings
//! (`+`) and resolutions (`=`).

use crate::error::DiscoveryError;
use crate::observation::{unescape_label, DiscoveryQuery, Observation, ObservedInstance};
use crate::process::{capture, step_window};
use crate::DiscoveryBrowser;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const PROGRAM: &str = "avahi-browse";

/// One parsable `avahi-browse` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvahiRecord {
    /// `+` line: instance appeared
    New { instance: String, service_type: String },
    /// `-` line: instance went away
    Removed { instance: String, service_type: String },
    /// `=` line: instance resolved
    Resolved {
        instance: String,
        service_type: String,
        host: String,
        address: String,
        port: u16,
    },
}

/// Parse `avahi-browse -p` output. Unknown or truncated lines are skipped.
pub fn parse_parsable_output(output: &str) -> Vec<AvahiRecord> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(';').collect();
            if fields.len() < 6 {
                return None;
            }
            let instance = unescape_label(fields[3]);
            let service_type = fields[4].to_string();
            match fields[0] {
                "+" => Some(AvahiRecord::New {
                    instance,
                    service_type,
                }),
                "-" => Some(AvahiRecord::Removed {
                    instance,
                    service_type,
                }),
                "=" if fields.len() >= 9 => Some(AvahiRecord::Resolved {
                    instance,
                    service_type,
                    host: fields[6].to_string(),
                    address: fields[7].to_string(),
                    port: fields[8].parse().ok()?,
                }),
                _ => None,
            }
        })
        .collect()
}

/// Fold parsed records into an observation for `service_type`.
pub fn observation_from_records(
    records: Vec<AvahiRecord>,
    service_type: &str,
) -> Observation {
    let wanted = service_type.trim_end_matches('.');
    let mut observation = Observation::new(PROGRAM);
    for record in records {
        match record {
            AvahiRecord::New {
                instance,
                service_type,
            } if service_type == wanted => {
                observation.record(ObservedInstance::browsed(instance));
            }
            AvahiRecord::Removed {
                instance,
                service_type,
            } if service_type == wanted => observation.remove(&instance),
            AvahiRecord::Resolved {
                instance,
                service_type,
                host,
                port,
                ..
            } if service_type == wanted => {
                observation.record(ObservedInstance::resolved(instance, host, port));
            }
            _ => {}
        }
    }
    observation
}

/// `avahi-browse` based browser.
#[derive(Debug, Clone)]
pub struct AvahiBrowser {
    program: String,
}

impl AvahiBrowser {
    pub fn new() -> Self {
        Self {
            program: PROGRAM.to_string(),
        }
    }

    /// Run a different executable instead of `avahi-browse` from `PATH`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for AvahiBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryBrowser for AvahiBrowser {
    fn name(&self) -> &'static str {
        PROGRAM
    }

    async fn observe(
        &self,
        query: &DiscoveryQuery,
        window: Duration,
        deadline: Instant,
    ) -> Result<Observation, DiscoveryError> {
        let Some(window) = step_window(window, deadline) else {
            let mut observation = Observation::new(PROGRAM);
            observation.window_elapsed = true;
            return Ok(observation);
        };

        let domain = query.domain.trim_end_matches('.');
        let output = capture(
            &self.program,
            &["-p", "-t", "-r", "-d", domain, &query.service_type],
            window,
        )
        .await?;

        let records = parse_parsable_output(&output.stdout);
        debug!(records = records.len(), timed_out = output.timed_out, "avahi-browse finished");

        let mut observation = observation_from_records(records, &query.service_type);
        observation.window_elapsed = output.timed_out;
        Ok(observation)
    }
}

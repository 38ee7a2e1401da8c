//! One complete check run: settle, probe, decide, report.

use crate::config::CheckConfig;
use crate::error::ProbeResult;
use crate::probe_set::ProbeSet;
use crate::report::{self, CheckReport};
use crate::verdict::VerdictPolicy;
use tracing::{info, Instrument};
use uuid::Uuid;

/// A configured check: which probes to run and how to judge them.
#[derive(Debug)]
pub struct Check {
    config: CheckConfig,
    probes: ProbeSet,
    policy: VerdictPolicy,
}

impl Check {
    pub fn new(config: CheckConfig, probes: ProbeSet, policy: VerdictPolicy) -> Self {
        Self {
            config,
            probes,
            policy,
        }
    }

    /// Full pairing suite with the critical-subset policy.
    pub fn pairing(config: CheckConfig) -> ProbeResult<Self> {
        let probes = ProbeSet::pairing(&config)?;
        Ok(Self::new(config, probes, VerdictPolicy::pairing()))
    }

    /// Focused mDNS discoverability check.
    pub fn discoverability(config: CheckConfig) -> ProbeResult<Self> {
        let probes = ProbeSet::discoverability(&config)?;
        Ok(Self::new(config, probes, VerdictPolicy::discoverability()))
    }

    /// Run all probes in order and decide the verdict.
    pub async fn run(&self) -> CheckReport {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("hapcheck.run", run_id = %run_id);
        self.run_with_id(&run_id).instrument(span).await
    }

    async fn run_with_id(&self, run_id: &str) -> CheckReport {
        let target = &self.config.target;
        report::emit_check_started(run_id, target, self.probes.len());

        if !self.config.settle.is_zero() {
            info!(
                settle_ms = self.config.settle.as_millis() as u64,
                "waiting for server to stabilize"
            );
            tokio::time::sleep(self.config.settle).await;
        }

        let result = self.probes.run(run_id, target).await;
        let verdict = self.policy.decide(&result);

        report::emit_summary(&result, &self.policy);
        report::emit_verdict(run_id, &verdict);

        CheckReport {
            target: target.clone(),
            result,
            verdict,
        }
    }
}

//! Ordered probe execution.

use crate::config::{CheckConfig, ConnectionTarget};
use crate::error::{ProbeError, ProbeResult};
use crate::outcome::{NamedProbeResult, ProbeOutcome, ProbeSetResult};
use crate::probe::{AdvertisementProbe, ApiShapeProbe, ChallengeProbe, Probe, TcpReachabilityProbe};
use crate::report;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Extra time a probe gets past its budget before it is abandoned.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// A fixed, ordered list of named probes.
pub struct ProbeSet {
    probes: Vec<Box<dyn Probe>>,
    timeout: Duration,
    grace: Duration,
    /// Set when the run stops at the first probe that does not pass; the
    /// text explains the skips.
    fail_fast: Option<String>,
}

impl ProbeSet {
    pub fn new(timeout: Duration) -> Self {
        Self {
            probes: Vec::new(),
            timeout,
            grace: DEFAULT_GRACE,
            fail_fast: None,
        }
    }

    /// Append a probe. A probe whose name is already present is rejected.
    pub fn with_probe(mut self, probe: Box<dyn Probe>) -> ProbeResult<Self> {
        if self.probes.iter().any(|p| p.name() == probe.name()) {
            return Err(ProbeError::Internal(format!(
                "duplicate probe name '{}'",
                probe.name()
            )));
        }
        self.probes.push(probe);
        Ok(self)
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Stop at the first probe that does not pass. `reason` is reported for
    /// every probe left unrun.
    pub fn fail_fast(mut self, reason: impl Into<String>) -> Self {
        self.fail_fast = Some(reason.into());
        self
    }

    /// The full pairing suite: TCP, challenge, web API, advertisement.
    pub fn pairing(config: &CheckConfig) -> ProbeResult<Self> {
        Self::new(config.timeout)
            .with_probe(Box::new(TcpReachabilityProbe::new()))?
            .with_probe(Box::new(ChallengeProbe::new()))?
            .with_probe(Box::new(ApiShapeProbe::new()))?
            .with_probe(Box::new(AdvertisementProbe::from_config(config)?))
    }

    /// Discoverability only: a plain port check gating the advertisement probe.
    pub fn discoverability(config: &CheckConfig) -> ProbeResult<Self> {
        Ok(Self::new(config.timeout)
            .with_probe(Box::new(TcpReachabilityProbe::connect_only()))?
            .with_probe(Box::new(AdvertisementProbe::from_config(config)?))?
            .fail_fast(format!(
                "HAP server is not running on port {}",
                config.target.hap_port
            )))
    }

    pub fn names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Run every probe in order on the calling task.
    pub async fn run(&self, run_id: &str, target: &ConnectionTarget) -> ProbeSetResult {
        let started_at = Utc::now();
        let total = self.probes.len();
        let mut results = Vec::with_capacity(total);

        for (index, probe) in self.probes.iter().enumerate() {
            report::emit_probe_started(index + 1, total, probe.name(), probe.title());

            let start = Instant::now();
            let outcome = self.run_guarded(probe.as_ref(), target).await;
            let result = NamedProbeResult::new(
                probe.name(),
                outcome,
                start.elapsed().as_millis() as u64,
            );
            report::emit_probe_finished(&result);

            let passed = result.passed();
            results.push(result);

            if let Some(detail) = self.skip_detail(probe.name(), passed) {
                for skipped in &self.probes[index + 1..] {
                    report::emit_probe_skipped(skipped.name(), &detail);
                }
                break;
            }
        }

        ProbeSetResult::new(run_id, started_at, results)
    }

    /// Why the remaining probes are skipped after `name` finished, if they are.
    fn skip_detail(&self, name: &str, passed: bool) -> Option<String> {
        match &self.fail_fast {
            Some(reason) if !passed => Some(format!("skipped: {} did not pass ({})", name, reason)),
            _ => None,
        }
    }

    /// Run one probe with a hard deadline, turning panics into internal faults.
    async fn run_guarded(&self, probe: &dyn Probe, target: &ConnectionTarget) -> ProbeOutcome {
        let deadline = self.timeout + self.grace;
        let guarded = AssertUnwindSafe(probe.run(target, self.timeout)).catch_unwind();

        match tokio::time::timeout(deadline, guarded).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                ProbeOutcome::from(ProbeError::Internal(format!("probe panicked: {}", msg)))
            }
            Err(_) => ProbeOutcome::inconclusive(format!(
                "probe did not return within {:?}",
                deadline
            )),
        }
    }
}

impl std::fmt::Debug for ProbeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeSet")
            .field("probes", &self.names())
            .field("timeout", &self.timeout)
            .field("grace", &self.grace)
            .field("fail_fast", &self.fail_fast)
            .finish()
    }
}

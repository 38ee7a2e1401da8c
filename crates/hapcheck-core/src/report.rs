//! Leveled lifecycle events and the end-of-run summary.
//!
//! Every event is one `tracing` line with a stable `event` field:
//! `check.started`, `probe.started`, `probe.finished`, `check.summary`,
//! `verdict.decided`. The subscriber installed by
//! [`init_tracing`](crate::telemetry::init_tracing) adds the timestamp and
//! level tag and writes to stderr.

use crate::config::ConnectionTarget;
use crate::outcome::{NamedProbeResult, ProbeSetResult, ProbeStatus};
use crate::verdict::{Verdict, VerdictPolicy};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Process exit status for `git bisect run` and CI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    /// Pass or pass-with-warnings
    Success,
    /// Fail, or an unexpected fault outside any probe
    Failure,
    /// Interrupted by the user (SIGINT convention)
    Interrupted,
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::Interrupted => 130,
        }
    }
}

impl From<&Verdict> for ExitStatus {
    fn from(verdict: &Verdict) -> Self {
        if verdict.is_success() {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }
}

/// Everything a run produced, serialisable for `--report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub target: ConnectionTarget,
    pub result: ProbeSetResult,
    pub verdict: Verdict,
}

impl CheckReport {
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::from(&self.verdict)
    }
}

/// Emit event: run started.
pub fn emit_check_started(run_id: &str, target: &ConnectionTarget, probes: usize) {
    info!(
        event = "check.started",
        run_id = %run_id,
        host = %target.host,
        hap_port = target.hap_port,
        web_port = target.web_port,
        probes = probes,
        "starting HAP pairing checks"
    );
}

/// Emit event: a probe is about to run.
pub fn emit_probe_started(index: usize, total: usize, name: &str, title: &str) {
    info!(
        event = "probe.started",
        probe = %name,
        "test {}/{}: {}",
        index,
        total,
        title
    );
}

/// Emit event: a probe finished. Level follows the outcome.
pub fn emit_probe_finished(result: &NamedProbeResult) {
    let status = result.outcome.status();
    let detail = &result.outcome.detail;
    match status {
        ProbeStatus::Pass => info!(
            event = "probe.finished",
            probe = %result.name,
            status = %status,
            duration_ms = result.duration_ms,
            "{}",
            detail
        ),
        ProbeStatus::Inconclusive => warn!(
            event = "probe.finished",
            probe = %result.name,
            status = %status,
            duration_ms = result.duration_ms,
            "{}",
            detail
        ),
        ProbeStatus::Fail => error!(
            event = "probe.finished",
            probe = %result.name,
            status = %status,
            duration_ms = result.duration_ms,
            fault = result.outcome.fault.as_deref().unwrap_or("none"),
            "{}",
            detail
        ),
    }
}

/// Emit event: a probe was skipped because an earlier gate failed.
pub fn emit_probe_skipped(name: &str, reason: &str) {
    warn!(event = "probe.skipped", probe = %name, "{}", reason);
}

/// One line per summary table row.
pub fn summary_lines(result: &ProbeSetResult, policy: &VerdictPolicy) -> Vec<String> {
    let width = policy
        .required()
        .iter()
        .map(String::len)
        .chain(result.results().iter().map(|r| r.name.len()))
        .max()
        .unwrap_or(0);

    let mut lines: Vec<String> = result
        .results()
        .iter()
        .map(|r| {
            let marker = if policy.is_critical(&r.name) { "*" } else { " " };
            format!(
                "{}{:<width$}  {:<12}  {}",
                marker,
                r.name,
                r.outcome.status().label(),
                r.outcome.detail,
                width = width
            )
        })
        .collect();

    for name in policy.required() {
        if result.get(name).is_none() {
            let marker = if policy.is_critical(name) { "*" } else { " " };
            lines.push(format!(
                "{}{:<width$}  {:<12}  did not run",
                marker,
                name,
                "NOT RUN",
                width = width
            ));
        }
    }
    lines
}

/// Emit the summary table, one line per probe; `*` marks critical probes.
pub fn emit_summary(result: &ProbeSetResult, policy: &VerdictPolicy) {
    info!(
        event = "check.summary",
        passed = result.passed_count(),
        failed = result.failed_count(),
        duration_ms = result.duration_ms(),
        "test results (* = critical):"
    );
    for line in summary_lines(result, policy) {
        info!(event = "check.summary", "  {}", line);
    }
}

/// Emit event: final verdict.
pub fn emit_verdict(run_id: &str, verdict: &Verdict) {
    match verdict {
        Verdict::Pass => info!(
            event = "verdict.decided",
            run_id = %run_id,
            verdict = verdict.label(),
            "all tests passed - HAP server should be pairable"
        ),
        Verdict::PassWithWarnings { failed } => warn!(
            event = "verdict.decided",
            run_id = %run_id,
            verdict = verdict.label(),
            "critical tests passed but some issues detected: {}",
            failed.join(", ")
        ),
        Verdict::Fail {
            failed_critical, ..
        } => error!(
            event = "verdict.decided",
            run_id = %run_id,
            verdict = verdict.label(),
            "critical tests failed ({}) - HAP server is NOT pairable",
            failed_critical.join(", ")
        ),
    }
}

//! Probe outcomes and the per-run result set.

use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tri-state view of an outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Pass,
    Fail,
    /// The check ran out of time or evidence without positively failing.
    Inconclusive,
}

impl ProbeStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ProbeStatus::Pass => "PASS",
            ProbeStatus::Fail => "FAIL",
            ProbeStatus::Inconclusive => "INCONCLUSIVE",
        }
    }
}

impl std::fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// What a single probe concluded.
///
/// When `conclusive` is false, `passed` carries no information and is always
/// `false`; callers that only ask "did it pass" treat it as a failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub passed: bool,
    pub conclusive: bool,
    pub detail: String,
    /// Fault category when the outcome came from a [`ProbeError`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl ProbeOutcome {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            conclusive: true,
            detail: detail.into(),
            fault: None,
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            conclusive: true,
            detail: detail.into(),
            fault: None,
        }
    }

    pub fn inconclusive(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            conclusive: false,
            detail: detail.into(),
            fault: None,
        }
    }

    pub fn status(&self) -> ProbeStatus {
        match (self.conclusive, self.passed) {
            (false, _) => ProbeStatus::Inconclusive,
            (true, true) => ProbeStatus::Pass,
            (true, false) => ProbeStatus::Fail,
        }
    }
}

impl From<ProbeError> for ProbeOutcome {
    fn from(err: ProbeError) -> Self {
        let fault = Some(err.kind().to_string());
        Self {
            passed: false,
            conclusive: true,
            detail: err.to_string(),
            fault,
        }
    }
}

impl<E> From<Result<ProbeOutcome, E>> for ProbeOutcome
where
    E: Into<ProbeError>,
{
    fn from(result: Result<ProbeOutcome, E>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(e) => ProbeOutcome::from(e.into()),
        }
    }
}

/// Outcome tagged with the probe that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamedProbeResult {
    pub name: String,
    pub outcome: ProbeOutcome,
    pub duration_ms: u64,
}

impl NamedProbeResult {
    pub fn new(name: impl Into<String>, outcome: ProbeOutcome, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            outcome,
            duration_ms,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome.passed
    }
}

/// Ordered results of one run. Built once, never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeSetResult {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    results: Vec<NamedProbeResult>,
}

impl ProbeSetResult {
    /// Build a result set. A later result with an already seen name is dropped,
    /// so the set holds at most one result per name.
    pub fn new(
        run_id: impl Into<String>,
        started_at: DateTime<Utc>,
        results: Vec<NamedProbeResult>,
    ) -> Self {
        let mut unique: Vec<NamedProbeResult> = Vec::with_capacity(results.len());
        for result in results {
            if !unique.iter().any(|r| r.name == result.name) {
                unique.push(result);
            }
        }
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: Utc::now(),
            results: unique,
        }
    }

    /// Results in the order the probes ran.
    pub fn results(&self) -> &[NamedProbeResult] {
        &self.results
    }

    pub fn get(&self, name: &str) -> Option<&NamedProbeResult> {
        self.results.iter().find(|r| r.name == name)
    }

    /// Whether `name` ran and passed. Missing names count as not passed.
    pub fn passed(&self, name: &str) -> bool {
        self.get(name).map(NamedProbeResult::passed).unwrap_or(false)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

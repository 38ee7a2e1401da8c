//! Verdict policy: folds named probe outcomes into one actionable signal.

use crate::outcome::ProbeSetResult;
use crate::probe::names;
use serde::{Deserialize, Serialize};

/// Overall decision for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// Every required probe passed.
    Pass,
    /// Every critical probe passed, but some others did not.
    PassWithWarnings {
        /// Non-critical probes that failed or were inconclusive, in run order
        failed: Vec<String>,
    },
    /// At least one critical probe failed.
    Fail {
        /// Critical probes that failed, were inconclusive or did not run
        failed_critical: Vec<String>,
        /// Every probe that did not pass
        failed: Vec<String>,
    },
}

impl Verdict {
    /// Whether the bridge should be considered pairable.
    pub fn is_success(&self) -> bool {
        !matches!(self, Verdict::Fail { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::PassWithWarnings { .. } => "pass-with-warnings",
            Verdict::Fail { .. } => "fail",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Boolean summary of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    /// All required probes passed
    pub overall: bool,
    /// All critical probes passed
    pub critical_ok: bool,
}

/// Which probes must pass, and which subset is enough on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictPolicy {
    required: Vec<String>,
    critical: Vec<String>,
}

impl VerdictPolicy {
    /// Build a policy. Critical names are always required too.
    pub fn new<R, C>(required: R, critical: C) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut required: Vec<String> = required.into_iter().map(Into::into).collect();
        let critical: Vec<String> = critical.into_iter().map(Into::into).collect();
        for name in &critical {
            if !required.contains(name) {
                required.push(name.clone());
            }
        }
        Self { required, critical }
    }

    /// Full pairing suite. TCP reachability and the mDNS advertisement are
    /// what a controller needs to find and open a session with the bridge,
    /// so they alone make a run actionable for bisection.
    pub fn pairing() -> Self {
        Self::new(
            [
                names::TCP_CONNECTION,
                names::HAP_CHALLENGE,
                names::WEB_API,
                names::MDNS_ADVERTISEMENT,
            ],
            [names::TCP_CONNECTION, names::MDNS_ADVERTISEMENT],
        )
    }

    /// Focused discoverability check: port listening and advertised.
    pub fn discoverability() -> Self {
        Self::new(
            [names::TCP_CONNECTION, names::MDNS_ADVERTISEMENT],
            [names::TCP_CONNECTION, names::MDNS_ADVERTISEMENT],
        )
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn critical(&self) -> &[String] {
        &self.critical
    }

    pub fn is_critical(&self, name: &str) -> bool {
        self.critical.iter().any(|c| c == name)
    }

    pub fn evaluate(&self, result: &ProbeSetResult) -> PolicyEvaluation {
        PolicyEvaluation {
            overall: self.required.iter().all(|n| result.passed(n)),
            critical_ok: self.critical.iter().all(|n| result.passed(n)),
        }
    }

    /// Decide the verdict. Missing or inconclusive probes count as failed.
    pub fn decide(&self, result: &ProbeSetResult) -> Verdict {
        let evaluation = self.evaluate(result);
        if evaluation.overall {
            return Verdict::Pass;
        }

        let failed: Vec<String> = self
            .ordered_names(result)
            .into_iter()
            .filter(|n| !result.passed(n))
            .collect();

        if evaluation.critical_ok {
            Verdict::PassWithWarnings {
                failed: failed
                    .into_iter()
                    .filter(|n| !self.is_critical(n))
                    .collect(),
            }
        } else {
            Verdict::Fail {
                failed_critical: failed
                    .iter()
                    .filter(|n| self.is_critical(n))
                    .cloned()
                    .collect(),
                failed,
            }
        }
    }

    /// Required names in run order, followed by any that never ran.
    fn ordered_names(&self, result: &ProbeSetResult) -> Vec<String> {
        let mut ordered: Vec<String> = result
            .results()
            .iter()
            .map(|r| r.name.clone())
            .filter(|n| self.required.contains(n))
            .collect();
        for name in &self.required {
            if !ordered.contains(name) {
                ordered.push(name.clone());
            }
        }
        ordered
    }
}

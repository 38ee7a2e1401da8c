//! HAP pairing challenge on a protected endpoint.

use super::{http_client, names, Probe};
use crate::config::ConnectionTarget;
use crate::error::{ProbeError, ProbeResult};
use crate::outcome::ProbeOutcome;
use async_trait::async_trait;
use std::time::Duration;

/// Path that lists accessories once a controller is paired.
pub const ACCESSORIES_PATH: &str = "/accessories";

/// HAP status for "Connection Authorization Required".
pub const HAP_CONNECTION_AUTHORIZATION_REQUIRED: u16 = 470;

/// Statuses that show the server is guarding the resource correctly.
pub const CHALLENGE_STATUSES: [u16; 2] = [401, HAP_CONNECTION_AUTHORIZATION_REQUIRED];

/// Requests `/accessories` without a paired session and expects a refusal.
///
/// Any 2xx means accessory data leaked to an unpaired client.
#[derive(Debug, Clone)]
pub struct ChallengeProbe {
    path: String,
}

impl Default for ChallengeProbe {
    fn default() -> Self {
        Self {
            path: ACCESSORIES_PATH.to_string(),
        }
    }
}

impl ChallengeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    async fn check(&self, target: &ConnectionTarget, timeout: Duration) -> ProbeResult<ProbeOutcome> {
        let url = target.hap_url(&self.path);
        let client = http_client(timeout)?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProbeError::from_http(&url, e))?;
        Ok(classify_status(&self.path, response.status().as_u16()))
    }
}

/// Decide the outcome from the status code alone.
pub fn classify_status(path: &str, status: u16) -> ProbeOutcome {
    if CHALLENGE_STATUSES.contains(&status) {
        ProbeOutcome::pass(format!("server requires pairing on {} (status {})", path, status))
    } else if (200..300).contains(&status) {
        ProbeOutcome::from(ProbeError::Protocol(format!(
            "security regression: {} returned {} without pairing",
            path, status
        )))
    } else {
        ProbeOutcome::from(ProbeError::Protocol(format!(
            "unexpected status {} on {} (expected 401 or 470)",
            status, path
        )))
    }
}

#[async_trait]
impl Probe for ChallengeProbe {
    fn name(&self) -> &str {
        names::HAP_CHALLENGE
    }

    fn title(&self) -> &str {
        "HAP discovery endpoint"
    }

    async fn run(&self, target: &ConnectionTarget, timeout: Duration) -> ProbeOutcome {
        self.check(target, timeout).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ProbeStatus;

    #[test]
    fn test_unauthorized_passes() {
        assert_eq!(classify_status("/accessories", 401).status(), ProbeStatus::Pass);
        assert_eq!(classify_status("/accessories", 470).status(), ProbeStatus::Pass);
    }

    #[test]
    fn test_success_is_security_regression() {
        let outcome = classify_status("/accessories", 200);
        assert!(!outcome.passed);
        assert!(outcome.detail.contains("security regression"));
        assert!(!classify_status("/accessories", 204).passed);
    }

    #[test]
    fn test_other_status_recorded() {
        let outcome = classify_status("/accessories", 404);
        assert!(!outcome.passed);
        assert!(outcome.detail.contains("404"));
    }
}

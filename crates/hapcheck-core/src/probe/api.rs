//! Shape of the companion web API's pairing endpoint.

use super::{http_client, names, Probe};
use crate::config::ConnectionTarget;
use crate::error::{ProbeError, ProbeResult};
use crate::outcome::ProbeOutcome;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Endpoint serving pairing metadata.
pub const PAIRING_PATH: &str = "/api/homekit/pairing";

/// Field carrying the encoded setup QR payload.
pub const QR_CODE_FIELD: &str = "qrCode";

/// Accepted names for the textual setup code; the API renamed it over time.
pub const PAIRING_CODE_FIELDS: [&str; 3] = ["pairingCode", "setupCode", "pinCode"];

/// Fetches pairing metadata and checks both codes are present.
#[derive(Debug, Clone)]
pub struct ApiShapeProbe {
    path: String,
}

impl Default for ApiShapeProbe {
    fn default() -> Self {
        Self {
            path: PAIRING_PATH.to_string(),
        }
    }
}

impl ApiShapeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    async fn check(&self, target: &ConnectionTarget, timeout: Duration) -> ProbeResult<ProbeOutcome> {
        let url = target.web_url(&self.path);
        let client = http_client(timeout)?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProbeError::from_http(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Protocol(format!(
                "{} returned status {}",
                self.path,
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::from_http(&url, e))?;
        let payload: Value = serde_json::from_str(&body).map_err(|e| {
            ProbeError::Protocol(format!("{} returned invalid JSON ({}): {}", self.path, e, body))
        })?;

        Ok(check_payload(&payload))
    }
}

/// Decide the outcome from a decoded payload.
pub fn check_payload(payload: &Value) -> ProbeOutcome {
    let Some(object) = payload.as_object() else {
        return ProbeOutcome::from(ProbeError::Protocol(format!(
            "pairing payload is not an object: {}",
            payload
        )));
    };

    let has_qr = object.contains_key(QR_CODE_FIELD);
    let code_field = PAIRING_CODE_FIELDS
        .iter()
        .find(|field| object.contains_key(**field));

    match (has_qr, code_field) {
        (true, Some(field)) => {
            debug!(payload = %payload, "pairing info");
            ProbeOutcome::pass(format!(
                "pairing endpoint returned {} and {}",
                QR_CODE_FIELD, field
            ))
        }
        (false, _) => ProbeOutcome::from(ProbeError::Protocol(format!(
            "missing {} in pairing payload: {}",
            QR_CODE_FIELD, payload
        ))),
        (true, None) => ProbeOutcome::from(ProbeError::Protocol(format!(
            "missing pairing code (one of {}) in pairing payload: {}",
            PAIRING_CODE_FIELDS.join(", "),
            payload
        ))),
    }
}

#[async_trait]
impl Probe for ApiShapeProbe {
    fn name(&self) -> &str {
        names::WEB_API
    }

    fn title(&self) -> &str {
        "Web API pairing endpoint"
    }

    async fn run(&self, target: &ConnectionTarget, timeout: Duration) -> ProbeOutcome {
        self.check(target, timeout).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_complete_payload_passes() {
        let outcome = check_payload(&json!({"qrCode": "X", "pairingCode": "123-45-678"}));
        assert!(outcome.passed);
    }

    #[test]
    fn test_aliases_accepted() {
        assert!(check_payload(&json!({"qrCode": "X", "setupCode": "123-45-678"})).passed);
        assert!(check_payload(&json!({"qrCode": "X", "pinCode": "123-45-678"})).passed);
    }

    #[test]
    fn test_missing_textual_code_fails() {
        let outcome = check_payload(&json!({"qrCode": "X"}));
        assert!(!outcome.passed);
        assert!(outcome.detail.contains("pairingCode"));
    }

    #[test]
    fn test_missing_qr_code_fails() {
        let outcome = check_payload(&json!({"pairingCode": "123"}));
        assert!(!outcome.passed);
        assert!(outcome.detail.contains("qrCode"));
    }

    #[test]
    fn test_non_object_fails() {
        assert!(!check_payload(&json!(["qrCode", "pairingCode"])).passed);
    }
}

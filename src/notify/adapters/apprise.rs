//! Apprise adapter (`spec.md` §4.3 "dispatches via the configured target
//! URIs; same failure policy as webhooks").
//!
//! Talks to a locally-run Apprise API server (`POST /notify/{config}` with
//! `{title, body, urls}`), rather than embedding Apprise's own
//! notification-service logic — the same boundary the rest of the
//! ecosystem draws around Apprise.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppriseError {
    #[error("unknown apprise target {0:?}")]
    UnknownTarget(String),
}

#[derive(Serialize)]
struct AppriseBody<'a> {
    title: &'a str,
    body: &'a str,
    urls: &'a str,
}

pub struct AppriseAdapter {
    client: reqwest::Client,
    api_base: String,
    targets: HashMap<String, String>,
}

impl AppriseAdapter {
    pub fn new(api_base: String, targets: HashMap<String, String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build apprise HTTP client");
        Self { client, api_base, targets }
    }

    pub async fn send(&self, target: &str, title: &str, body: &str) -> Result<(), AppriseError> {
        let Some(urls) = self.targets.get(target) else {
            return Err(AppriseError::UnknownTarget(target.to_string()));
        };

        let endpoint = format!("{}/notify", self.api_base.trim_end_matches('/'));
        let payload = AppriseBody { title, body, urls };

        match self.client.post(&endpoint).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                tracing::warn!(target = %target, status = %resp.status(), "apprise target returned non-success status");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(target = %target, error = %e, "apprise delivery failed, dropping");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_target_is_rejected_before_any_request() {
        let adapter = AppriseAdapter::new("http://localhost:8000".to_string(), HashMap::new(), Duration::from_secs(5));
        let result = futures::executor::block_on(adapter.send("missing", "t", "b"));
        assert!(matches!(result, Err(AppriseError::UnknownTarget(_))));
    }
}

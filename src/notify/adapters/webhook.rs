//! Webhook adapter (`spec.md` §4.3 "POSTs JSON bodies; honours per-target
//! URL; timeout configurable; failure is logged and the attempt is
//! dropped").

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("unknown webhook target {0:?}")]
    UnknownTarget(String),
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    rule: &'a str,
    title: &'a str,
    body: &'a str,
}

pub struct WebhookAdapter {
    client: reqwest::Client,
    targets: HashMap<String, String>,
}

impl WebhookAdapter {
    pub fn new(targets: HashMap<String, String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build webhook HTTP client");
        Self { client, targets }
    }

    /// Sends one notification. Any failure (unknown target, network error,
    /// non-2xx status) is logged by the caller and dropped; this adapter
    /// keeps no retry queue.
    pub async fn send(&self, target: &str, rule_name: &str, title: &str, body: &str) -> Result<(), WebhookError> {
        let Some(url) = self.targets.get(target) else {
            return Err(WebhookError::UnknownTarget(target.to_string()));
        };

        let payload = WebhookBody { rule: rule_name, title, body };

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                tracing::warn!(target = %target, status = %resp.status(), "webhook target returned non-success status");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(target = %target, error = %e, "webhook delivery failed, dropping");
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
        let adapter = WebhookAdapter::new(HashMap::new(), Duration::from_secs(5));
        let result = futures::executor::block_on(adapter.send("missing", "rule", "t", "b"));
        assert!(matches!(result, Err(WebhookError::UnknownTarget(_))));
    }
}

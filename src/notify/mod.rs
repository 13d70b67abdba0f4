//! Notification rule evaluation and fan-out (`spec.md` §4.3).
//!
//! [`rules::RuleEngine`] decides, per detection, which configured rules
//! fire and renders their templates; [`adapters`] hold the per-service
//! delivery mechanics. [`NotificationRouter`] is the thin glue the web
//! daemon owns: evaluate, then dispatch each surviving rule to its
//! service's adapter, logging and dropping any adapter that isn't wired
//! up for this process.

pub mod adapters;
mod rules;
mod template;

pub use rules::{Dispatch, RuleEngine};
pub use template::{render, NotificationContext, PLACEHOLDERS};

use crate::config::{NotificationService, NotificationsConfig};
use crate::store::DetectionStore;
use crate::types::{Detection, SpeciesReference};

use adapters::apprise::AppriseAdapter;
use adapters::mqtt::MqttAdapter;
use adapters::webhook::WebhookAdapter;

/// Owns the configured adapters and routes each rule's dispatch to the
/// right one. An adapter that is `None` (e.g. MQTT disabled) causes
/// dispatches targeting it to be logged and dropped rather than panic —
/// a misconfigured rule must not take the notification path down.
pub struct NotificationRouter {
    pub engine: RuleEngine,
    pub webhook: WebhookAdapter,
    pub apprise: AppriseAdapter,
    pub mqtt: Option<MqttAdapter>,
}

impl NotificationRouter {
    pub async fn handle_detection(
        &mut self,
        config: &NotificationsConfig,
        detection: &Detection,
        taxonomy: Option<&SpeciesReference>,
        store: &DetectionStore<'_>,
    ) {
        let now = chrono::Utc::now();
        let dispatches = self.engine.evaluate(config, detection, taxonomy, store, now).await;

        for dispatch in dispatches {
            self.send(dispatch).await;
        }
    }

    async fn send(&self, dispatch: Dispatch) {
        let result = match dispatch.service {
            NotificationService::Webhook => self
                .webhook
                .send(&dispatch.target, &dispatch.rule_name, &dispatch.title, &dispatch.body)
                .await
                .map_err(|e| e.to_string()),
            NotificationService::Apprise => self
                .apprise
                .send(&dispatch.target, &dispatch.title, &dispatch.body)
                .await
                .map_err(|e| e.to_string()),
            NotificationService::Mqtt => {
                let Some(mqtt) = &self.mqtt else {
                    tracing::warn!(rule = %dispatch.rule_name, "rule targets mqtt but the mqtt adapter is not configured");
                    return;
                };
                let payload = serde_json::json!({
                    "rule": dispatch.rule_name,
                    "title": dispatch.title,
                    "body": dispatch.body,
                });
                mqtt.publish_detection(&payload).await;
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!(rule = %dispatch.rule_name, error = %e, "notification dispatch failed");
        }
    }
}

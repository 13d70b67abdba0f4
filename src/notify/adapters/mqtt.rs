//! MQTT adapter (`spec.md` §4.3, §6 "MQTT topics").
//!
//! One long-lived connection, published detection/GPS/health/status/
//! system/config topics under a configurable prefix. Status is the LWT
//! payload so subscribers see the process die even on a hard crash.
//! Reconnects with exponential backoff up to a bounded retry count, then
//! quiet-fails for the rest of the process lifetime — matching the
//! self-healer's bounded-retry posture in spirit, simplified to a single
//! terminal give-up rather than a periodic re-check, since a broker that
//! refuses `MAX_RECONNECT_ATTEMPTS` reconnects in a row is assumed down
//! for this process's lifetime.

use std::time::Duration;

use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use tokio::sync::mpsc;

const MAX_RECONNECT_ATTEMPTS: u32 = 8;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

pub struct MqttTopics {
    pub detections: String,
    pub status: String,
    pub health: String,
    pub gps: String,
    pub system: String,
    pub config: String,
}

impl MqttTopics {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            detections: format!("{prefix}/detections"),
            status: format!("{prefix}/status"),
            health: format!("{prefix}/health"),
            gps: format!("{prefix}/gps"),
            system: format!("{prefix}/system"),
            config: format!("{prefix}/config"),
        }
    }
}

pub struct MqttAdapter {
    client: AsyncClient,
    topics: MqttTopics,
}

impl MqttAdapter {
    /// Opens the connection and spawns the background event-loop task
    /// that drives it. `client_id`/`host`/`port` come straight from
    /// `MqttConfig`; the returned adapter is ready to publish immediately
    /// (`rumqttc` buffers outgoing publishes until the connection is up).
    pub fn connect(
        client_id: &str,
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        topic_prefix: &str,
    ) -> Self {
        let topics = MqttTopics::new(topic_prefix);

        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(u), Some(p)) = (username, password) {
            options.set_credentials(u, p);
        }
        options.set_last_will(LastWill::new(&topics.status, "offline", QoS::AtLeastOnce, true));

        let (client, eventloop) = AsyncClient::new(options, 64);

        let publish_online = client.clone();
        let status_topic = topics.status.clone();
        tokio::spawn(async move {
            if let Err(e) = publish_online.publish(&status_topic, QoS::AtLeastOnce, true, "online").await {
                tracing::warn!(error = %e, "failed to publish initial online status");
            }
        });

        tokio::spawn(drive_eventloop(eventloop));

        Self { client, topics }
    }

    pub async fn publish_detection(&self, payload: &serde_json::Value) {
        self.publish(&self.topics.detections, payload, false).await;
    }

    pub async fn publish_health(&self, payload: &serde_json::Value) {
        self.publish(&self.topics.health, payload, true).await;
    }

    pub async fn publish_gps(&self, payload: &serde_json::Value) {
        self.publish(&self.topics.gps, payload, false).await;
    }

    pub async fn publish_system(&self, payload: &serde_json::Value) {
        self.publish(&self.topics.system, payload, false).await;
    }

    pub async fn publish_config(&self, payload: &serde_json::Value) {
        self.publish(&self.topics.config, payload, false).await;
    }

    async fn publish(&self, topic: &str, payload: &serde_json::Value, retain: bool) {
        let Ok(bytes) = serde_json::to_vec(payload) else {
            tracing::warn!(topic = %topic, "failed to serialize mqtt payload, dropping");
            return;
        };
        if let Err(e) = self.client.publish(topic, QoS::AtLeastOnce, retain, bytes).await {
            tracing::warn!(topic = %topic, error = %e, "mqtt publish failed, dropping");
        }
    }
}

/// Polls the event loop, reconnecting with exponential backoff. After
/// `MAX_RECONNECT_ATTEMPTS` consecutive failures, logs and returns —
/// publishes from then on simply buffer in `rumqttc` and are dropped once
/// its internal queue fills, per the adapter's "quiet-fail" contract.
async fn drive_eventloop(mut eventloop: rumqttc::EventLoop) {
    let mut consecutive_failures = 0u32;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match eventloop.poll().await {
            Ok(_event) => {
                consecutive_failures = 0;
                backoff = INITIAL_BACKOFF;
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::warn!(error = %e, attempt = consecutive_failures, "mqtt event loop error");

                if consecutive_failures >= MAX_RECONNECT_ATTEMPTS {
                    tracing::error!("mqtt broker unreachable after {MAX_RECONNECT_ATTEMPTS} attempts, giving up for the rest of this process");
                    return;
                }

                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Shared plumbing for feeding detections from the event bus into the
/// MQTT adapter without the adapter needing to know about `EventBus`
/// directly; kept as a typed channel so the daemon wiring stays in
/// `bin/web.rs` rather than here.
pub type DetectionSender = mpsc::Sender<serde_json::Value>;

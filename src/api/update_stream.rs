//! The update-progress SSE bridge (`spec.md` §4.4 "a localhost-only HTTP
//! server exposes a single endpoint that streams update-status events",
//! §6 "`GET /api/update/stream`").
//!
//! Mounted both by the web daemon (nested under `/api`, alongside the
//! detection/analytics surface) and by the update daemon itself (at its
//! own localhost-only root) — the two descriptions in `spec.md` name the
//! same stream from the consumer's and the owner's point of view, so one
//! router definition serves both.
//!
//! There is no event bus for update progress (that exists only for
//! detections); `update_state.json` is the single source of truth, so
//! this polls it on an interval and emits a frame only when the phase
//! (or the terminal result) changes, plus a heartbeat when idle.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use serde::Serialize;

use crate::notify::adapters::sse::HEARTBEAT_INTERVAL;
use crate::types::UpdatePhase;
use crate::update::UpdateChannel;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct UpdateStreamState {
    channel: Arc<UpdateChannel>,
    data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct ProgressFrame {
    phase: UpdatePhase,
    current_step: String,
    error: Option<String>,
}

pub fn router(update_channel: Arc<UpdateChannel>, data_dir: PathBuf) -> Router {
    let state = UpdateStreamState {
        channel: update_channel,
        data_dir,
    };
    Router::new().route("/update/stream", get(stream_progress)).with_state(state)
}

fn load_state(data_dir: &PathBuf) -> Option<crate::types::UpdateState> {
    let context_state_path = data_dir.join("update_state.json");
    match std::fs::read(&context_state_path) {
        Ok(bytes) => serde_json::from_slice(&bytes).ok(),
        Err(_) => None,
    }
}

async fn stream_progress(State(state): State<UpdateStreamState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let channel = state.channel;
    let data_dir = state.data_dir;

    let ticks_per_heartbeat = (HEARTBEAT_INTERVAL.as_secs() / POLL_INTERVAL.as_secs()).max(1);

    let stream = async_stream::stream! {
        let mut last: Option<ProgressFrame> = None;
        let mut ticks_since_emission: u64 = 0;

        loop {
            let current = load_state(&data_dir).map(|s| ProgressFrame {
                phase: s.phase,
                current_step: s.current_step,
                error: s.error,
            });

            if current != last {
                if let Some(frame) = &current {
                    match serde_json::to_string(frame) {
                        Ok(data) => yield Ok(Event::default().event("progress").data(data)),
                        Err(e) => tracing::error!(error = %e, "failed to serialize update progress frame"),
                    }
                } else if let Ok(Some(result)) = channel.read_result() {
                    match serde_json::to_string(&result) {
                        Ok(data) => yield Ok(Event::default().event("result").data(data)),
                        Err(e) => tracing::error!(error = %e, "failed to serialize update result frame"),
                    }
                }
                last = current;
                ticks_since_emission = 0;
            } else {
                ticks_since_emission += 1;
                if ticks_since_emission >= ticks_per_heartbeat {
                    yield Ok(Event::default().comment("heartbeat"));
                    ticks_since_emission = 0;
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("keep-alive"))
}

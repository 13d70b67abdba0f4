//! Live detection stream (`spec.md` §4.3 "SSE adapter", §6
//! "`GET /api/detections/live`").
//!
//! One `EventBus::subscribe` per connection, one task per connection
//! (`spec.md` §4.3 "one task per active SSE subscriber"), grounded in the
//! `async_stream::stream! { yield Ok(...) }` + `Sse::new(...).keep_alive(...)`
//! pattern used for broadcast fan-out elsewhere in the pack.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;

use crate::notify::adapters::sse::{DetectionFrame, HEARTBEAT_INTERVAL};

use crate::api::AppState;

/// `GET /api/detections/live` — a detection every time one is published
/// to the bus, a comment heartbeat every `HEARTBEAT_INTERVAL` otherwise.
pub async fn live_detections(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut subscription = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                detection = subscription.recv() => {
                    match detection {
                        Some(detection) => {
                            let frame = DetectionFrame::from(detection.as_ref());
                            match serde_json::to_string(&frame) {
                                Ok(data) => yield Ok(Event::default().event("detection").data(data)),
                                Err(e) => tracing::error!(error = %e, "failed to serialize detection frame"),
                            }
                        }
                        None => break,
                    }
                }
                () = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL).text("keep-alive"))
}

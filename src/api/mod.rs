//! The Web/API daemon's HTTP/JSON + SSE surface (`spec.md` §4.5, §6).
//!
//! Mirrors the teacher's `api` module shape (`mod.rs` assembling the
//! router plus CORS/trace/compression layers, `envelope.rs` for the
//! response/error shapes, `routes.rs` for the route table, `handlers/`
//! for the per-endpoint logic) generalized from the teacher's single
//! dashboard state to the detection/analytics/update surfaces this
//! appliance serves.

pub mod envelope;
pub mod handlers;
pub mod routes;
pub mod update_stream;

pub use envelope::ApiError;

use std::path::PathBuf;

use sqlx::SqlitePool;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::QueryCache;
use crate::eventbus::EventBus;

/// Shared state for every detection/analytics request handler. Cloning is
/// cheap: every field is itself a pool handle or an `Arc`-backed clone.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub reference_db_path: PathBuf,
    pub cache: QueryCache,
    pub event_bus: EventBus,
    pub language: String,
}

/// Assembles the full router: detections, analytics, live-detections SSE,
/// and the update-progress SSE bridge, with the teacher's tracing/
/// compression/CORS layer stack (`spec.md` explicitly has no
/// authentication layer — "the HTTP surface assumes a trusted reverse
/// proxy" — so no auth middleware is added here).
pub fn create_app(state: AppState, update_channel: std::sync::Arc<crate::update::UpdateChannel>, data_dir: PathBuf) -> axum::Router {
    axum::Router::new()
        .merge(routes::api_routes(state))
        .nest("/api", update_stream::router(update_channel, data_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

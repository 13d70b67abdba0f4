//! Route table for the detection/analytics/live-stream surface
//! (`spec.md` §6 "HTTP JSON API (web daemon)").

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::AppState;

/// Builds the `/api/detections/*` and `/api/analytics/*` router, fully
/// bound to `state` (a `Router<()>`, mergeable into any outer router
/// regardless of that router's own state type).
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/detections/recent", get(handlers::recent))
        .route("/api/detections/live", get(handlers::live_detections))
        .route("/api/detections/count", get(handlers::count))
        .route("/api/detections/species/summary", get(handlers::species_summary))
        .route("/api/detections/taxonomy/families", get(handlers::taxonomy_families))
        .route("/api/detections/:uuid", get(handlers::get_by_id))
        .route("/api/detections/", get(handlers::list))
        .route("/api/analytics/heatmap", get(handlers::heatmap))
        .route("/api/analytics/accumulation", get(handlers::accumulation))
        .route("/api/analytics/beta-diversity", get(handlers::beta_diversity))
        .route("/api/analytics/correlation", get(handlers::correlation))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryCache;
    use crate::eventbus::EventBus;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let pool = crate::store::open_pool(std::path::Path::new(":memory:")).await.unwrap();
        AppState {
            db: pool,
            reference_db_path: std::path::PathBuf::from("/nonexistent/ioc.db"),
            cache: QueryCache::new(),
            event_bus: EventBus::new(16),
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn recent_detections_endpoint_returns_ok_on_an_empty_store() {
        let app = api_routes(test_state().await);

        let response = app
            .oneshot(Request::builder().uri("/api/detections/recent?limit=5").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_detection_id_is_a_404() {
        let app = api_routes(test_state().await);
        let id = uuid::Uuid::new_v4();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/detections/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

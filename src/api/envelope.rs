//! Response envelope and error mapping for the HTTP/JSON surface
//! (`spec.md` §6 "Wire formats: JSON throughout").
//!
//! Grounded in the teacher's `api::envelope` module: every handler either
//! returns `Json<T>` directly for the common case, or `Result<Json<T>,
//! ApiError>` when the query can fail, with [`ApiError`] mapping every
//! failure mode onto the right status code rather than ever panicking
//! (`spec.md` §7 "HTTP handlers never let an error type escape as a
//! panic").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::cache::QueryCache;
use crate::store::StoreError;

/// Uniform error shape: `{ "error": { "code": "...", "message": "..." } }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "NOT_FOUND",
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "store error serving request");
        ApiError::internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": { "code": self.code, "message": self.message }
        });
        (self.status, Json(body)).into_response()
    }
}

/// Runs a cached query through [`QueryCache::get_or_compute`], mapping a
/// query failure onto [`ApiError`]. Cache-layer failures never reach the
/// caller (`spec.md` §4.5 "never surface a cache failure as a request
/// failure") — that contract is already enforced inside `QueryCache`
/// itself; this helper only adapts the `Result<T, ApiError>` boundary.
pub async fn cached<T, F, Fut>(
    cache: &QueryCache,
    key: crate::types::CacheKey,
    ttl_seconds: u64,
    query: F,
) -> Result<Json<T>, ApiError>
where
    T: Serialize + serde::de::DeserializeOwned + Clone,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, ApiError>>,
{
    let value = cache
        .get_or_compute(key, std::time::Duration::from_secs(ttl_seconds), query)
        .await?;
    Ok(Json(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn not_found_serializes_with_the_right_status_and_code() {
        let resp = ApiError::not_found("no such detection").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["error"]["code"], "NOT_FOUND");
        assert_eq!(v["error"]["message"], "no such detection");
    }
}

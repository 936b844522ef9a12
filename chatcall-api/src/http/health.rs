//! Liveness endpoint for deployment probes

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::http::AppState;

pub fn create_health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Answers as long as the process is serving requests. Carries no call
/// state; probes must not depend on registry contents.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_is_ok() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }
}

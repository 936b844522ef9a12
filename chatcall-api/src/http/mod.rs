//! HTTP surface
//!
//! REST routes for token minting and call lifecycle, the WebSocket event
//! feed, and the liveness probe, assembled into one router.

pub mod error;
pub mod events;
pub mod health;
pub mod middleware;
pub mod response;
pub mod rtc;
pub mod videocall;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use chatcall_core::service::{CallRegistry, JwtService, RtcTokenService, UserEventHub};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};
pub use response::ApiResponse;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub jwt_service: JwtService,
    pub token_service: RtcTokenService,
    pub registry: Arc<CallRegistry>,
    pub hub: UserEventHub,
}

/// Assemble the route table. Layers wrap only the routes registered
/// before them, and state attaches last.
pub fn create_router(
    jwt_service: JwtService,
    token_service: RtcTokenService,
    registry: Arc<CallRegistry>,
    hub: UserEventHub,
) -> Router {
    let state = AppState {
        jwt_service,
        token_service,
        registry,
        hub,
    };

    Router::new()
        .merge(health::create_health_router())
        .route("/api/rtc/token", post(rtc::generate_token))
        .route("/api/videocall/initiate", post(videocall::initiate_call))
        .route("/api/videocall/accept", post(videocall::accept_call))
        .route("/api/videocall/reject", post(videocall::reject_call))
        .route("/api/videocall/end", post(videocall::end_call))
        .route(
            "/api/videocall/status/{call_id}",
            get(videocall::get_call_status),
        )
        .route("/api/events/ws", get(events::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

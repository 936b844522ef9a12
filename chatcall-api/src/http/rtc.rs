//! RTC token HTTP endpoint
//!
//! Mints time-limited channel access tokens for the external video provider.
//! The caller passes the token, app id and uid straight to the provider SDK.

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::http::middleware::AuthUser;
use crate::http::{ApiResponse, AppError, AppResult, AppState};

/// Request body for token minting
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(default)]
    pub channel_name: String,
    /// Provider-side numeric identity; omitted or 0 lets the provider assign one
    #[serde(default)]
    pub uid: Option<u32>,
}

/// Response payload for a minted token
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub app_id: String,
    pub channel_name: String,
    pub uid: u32,
}

/// Mint a publisher token for a channel
///
/// Path: `POST /api/rtc/token`
/// Auth: Required (JWT)
///
/// Returns 400 when the channel name is missing and 500 when the provider
/// credentials are not configured; the failure message never carries key
/// material.
pub async fn generate_token(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<TokenRequest>,
) -> AppResult<impl IntoResponse> {
    let uid = req.uid.unwrap_or(0);

    let minted = state
        .token_service
        .mint(&req.channel_name, uid)
        .map_err(|err| {
            if err.is_internal() {
                tracing::error!("Error generating provider token: {}", err);
                AppError::internal_server_error("Failed to generate token")
            } else {
                AppError::from(err)
            }
        })?;

    Ok(ApiResponse::data(TokenResponse {
        token: minted.token,
        app_id: minted.app_id,
        channel_name: minted.channel_name,
        uid: minted.uid,
    }))
}

//! Video call lifecycle HTTP endpoints
//!
//! Thin JSON boundary over the call registry: handlers authenticate the
//! actor, parse the typed request body and translate registry results into
//! the response envelope. All state transitions and notifications happen
//! inside the registry.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use chatcall_core::models::CallId;

use crate::http::middleware::AuthUser;
use crate::http::{ApiResponse, AppError, AppResult, AppState};

/// Request body for initiating a call
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateCallRequest {
    #[serde(default)]
    pub receiver_username: String,
}

/// Request body for accept/reject/end, which act on an existing call
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIdRequest {
    #[serde(default)]
    pub call_id: String,
}

// A missing id is reported as a plain 400, not a schema error
fn parse_call_id(raw: String) -> Result<CallId, AppError> {
    if raw.is_empty() {
        return Err(AppError::bad_request("Call ID is required"));
    }
    Ok(CallId::from_string(raw))
}

/// Start ringing another user
///
/// Path: `POST /api/videocall/initiate`
/// Auth: Required (JWT)
pub async fn initiate_call(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<InitiateCallRequest>,
) -> AppResult<impl IntoResponse> {
    let initiated = state
        .registry
        .initiate(auth.identity, &req.receiver_username)?;

    Ok(ApiResponse::with_message(
        "Call initiated successfully",
        initiated,
    ))
}

/// Accept a ringing call
///
/// Path: `POST /api/videocall/accept`
/// Auth: Required (JWT)
pub async fn accept_call(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CallIdRequest>,
) -> AppResult<impl IntoResponse> {
    let call_id = parse_call_id(req.call_id)?;
    let accepted = state.registry.accept(auth.identity, &call_id)?;

    Ok(ApiResponse::with_message(
        "Call accepted successfully",
        accepted,
    ))
}

/// Reject a ringing call (or cancel it, when the actor is the caller)
///
/// Path: `POST /api/videocall/reject`
/// Auth: Required (JWT)
pub async fn reject_call(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CallIdRequest>,
) -> AppResult<impl IntoResponse> {
    let call_id = parse_call_id(req.call_id)?;
    state.registry.reject(&auth.identity, &call_id)?;

    Ok(ApiResponse::message("Call rejected successfully"))
}

/// Hang up an active call
///
/// Path: `POST /api/videocall/end`
/// Auth: Required (JWT)
pub async fn end_call(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(req): Json<CallIdRequest>,
) -> AppResult<impl IntoResponse> {
    let call_id = parse_call_id(req.call_id)?;
    let ended = state.registry.end(&auth.identity, &call_id)?;

    Ok(ApiResponse::with_message("Call ended successfully", ended))
}

/// Look up the state of a call the requester is part of
///
/// Path: `GET /api/videocall/status/{call_id}`
/// Auth: Required (JWT)
///
/// Outsiders get the same 404 as an unknown id, so the endpoint leaks
/// nothing about calls between other users.
pub async fn get_call_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let call_id = parse_call_id(call_id)?;
    let view = state.registry.status(&auth.identity, &call_id)?;

    Ok(ApiResponse::data(view))
}

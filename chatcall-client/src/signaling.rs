//! Signaling REST client
//!
//! Bearer-authenticated HTTP client for the call service. Every response,
//! success or failure, is the `{success, message, data}` envelope, so the
//! body is parsed regardless of HTTP status and failures surface the
//! service's own message.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use chatcall_core::models::CallId;

use crate::error::ClientError;

/// One pooled HTTP client shared by every [`SignalingClient`]
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .pool_max_idle_per_host(10)
        .build()
        .expect("shared HTTP client construction failed")
});

/// A minted provider token with everything needed to join its channel
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub token: String,
    pub app_id: String,
    pub channel_name: String,
    pub uid: u32,
}

/// Identifiers returned when a call is created or picked up
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHandle {
    pub call_id: CallId,
    pub channel_name: String,
}

/// Snapshot of a call's registry state
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStatusInfo {
    pub status: String,
    pub channel_name: String,
    pub start_time: DateTime<Utc>,
}

/// Response envelope shared by every endpoint
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

/// Operations the call driver needs from the service.
///
/// Split from the HTTP client so the driver can be exercised against a mock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Signaling: Send + Sync {
    /// Mint a provider token for a channel
    async fn mint_token(&self, channel_name: &str, uid: u32) -> Result<TokenGrant, ClientError>;

    /// Start ringing another user
    async fn initiate(&self, receiver_username: &str) -> Result<CallHandle, ClientError>;

    /// Pick up a ringing call
    async fn accept(&self, call_id: &CallId) -> Result<CallHandle, ClientError>;

    /// Decline a ringing call, or cancel one you placed
    async fn reject(&self, call_id: &CallId) -> Result<(), ClientError>;

    /// Hang up an active call
    async fn end(&self, call_id: &CallId) -> Result<(), ClientError>;

    /// Fetch the current state of a call you are part of
    async fn status(&self, call_id: &CallId) -> Result<CallStatusInfo, ClientError>;
}

/// HTTP implementation of [`Signaling`]
pub struct SignalingClient {
    base_url: String,
    bearer_token: String,
    client: Client,
}

impl SignalingClient {
    /// Create a client for the service at `base_url`, authenticating every
    /// request with the chat application's JWT (reuses the shared pool)
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Self {
            base_url,
            bearer_token: bearer_token.into(),
            client: SHARED_CLIENT.clone(),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Envelope<T>, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        self.execute(self.client.post(&url).json(&body)).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        self.execute(self.client.get(&url)).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Envelope<T>, ClientError> {
        let response = request.bearer_auth(&self.bearer_token).send().await?;

        let status = response.status();
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|err| ClientError::Parse(err.to_string()))?;

        if !envelope.success {
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| "Request failed".to_string()),
            });
        }

        Ok(envelope)
    }
}

#[async_trait]
impl Signaling for SignalingClient {
    async fn mint_token(&self, channel_name: &str, uid: u32) -> Result<TokenGrant, ClientError> {
        let body = json!({
            "channelName": channel_name,
            "uid": uid,
        });

        let envelope: Envelope<TokenGrant> = self.post("/api/rtc/token", body).await?;
        envelope
            .data
            .ok_or_else(|| ClientError::Parse("Missing token data in response".to_string()))
    }

    async fn initiate(&self, receiver_username: &str) -> Result<CallHandle, ClientError> {
        let body = json!({
            "receiverUsername": receiver_username,
        });

        let envelope: Envelope<CallHandle> = self.post("/api/videocall/initiate", body).await?;
        envelope
            .data
            .ok_or_else(|| ClientError::Parse("Missing call data in response".to_string()))
    }

    async fn accept(&self, call_id: &CallId) -> Result<CallHandle, ClientError> {
        let body = json!({
            "callId": call_id,
        });

        let envelope: Envelope<CallHandle> = self.post("/api/videocall/accept", body).await?;
        envelope
            .data
            .ok_or_else(|| ClientError::Parse("Missing call data in response".to_string()))
    }

    async fn reject(&self, call_id: &CallId) -> Result<(), ClientError> {
        let body = json!({
            "callId": call_id,
        });

        let _: Envelope<serde_json::Value> = self.post("/api/videocall/reject", body).await?;
        Ok(())
    }

    async fn end(&self, call_id: &CallId) -> Result<(), ClientError> {
        let body = json!({
            "callId": call_id,
        });

        let _: Envelope<serde_json::Value> = self.post("/api/videocall/end", body).await?;
        Ok(())
    }

    async fn status(&self, call_id: &CallId) -> Result<CallStatusInfo, ClientError> {
        let path = format!("/api/videocall/status/{call_id}");

        let envelope: Envelope<CallStatusInfo> = self.get(&path).await?;
        envelope
            .data
            .ok_or_else(|| ClientError::Parse("Missing status data in response".to_string()))
    }
}

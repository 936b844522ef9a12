//! RTC Channel Token Minting
//!
//! Mints the time-limited channel access tokens the video provider's SDK
//! expects when joining a call channel.
//!
//! ## Token format
//! - Version prefix `007`, then the app id in clear, then a base64url
//!   payload: `HMAC-SHA256(app_certificate, app_id || payload)` followed by
//!   the payload itself (`expiry:u32be || uid:u32be || role:u8 || channel`).
//! - Tokens are verifiable and decodable with the same certificate, so
//!   expiry and channel binding can be checked without calling the provider.
//!
//! ## Lifetime
//! - Fixed 24 hour window from mint time; there is no refresh. Clients
//!   joining near the end of the window simply mint again.

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::ProviderConfig;
use crate::{Error, Result};

/// Fixed token lifetime in seconds (24 hours)
pub const TOKEN_TTL_SECS: u32 = 86_400;

/// Token format version prefix
const TOKEN_VERSION: &str = "007";

/// HMAC-SHA256 output length in bytes
const SIGNATURE_LEN: usize = 32;

/// Channel role baked into a minted token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Publisher = 1,
    Subscriber = 2,
}

impl ChannelRole {
    const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Publisher),
            2 => Some(Self::Subscriber),
            _ => None,
        }
    }
}

/// A freshly minted channel token plus the fields clients echo to the SDK
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub app_id: String,
    pub channel_name: String,
    pub uid: u32,
    pub expires_at: DateTime<Utc>,
}

/// Fields recovered from a minted token after signature verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedToken {
    pub channel_name: String,
    pub uid: u32,
    pub role: ChannelRole,
    pub expires_at: DateTime<Utc>,
}

/// RTC token minting service
#[derive(Clone)]
pub struct RtcTokenService {
    config: ProviderConfig,
}

impl std::fmt::Debug for RtcTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtcTokenService")
            .field("app_id", &self.config.app_id)
            .finish()
    }
}

impl RtcTokenService {
    #[must_use]
    pub const fn new(config: ProviderConfig) -> Self {
        Self { config }
    }

    /// True when both provider credentials are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.config.app_id.is_empty() && !self.config.app_certificate.is_empty()
    }

    /// Mint a publisher token for `channel_name`.
    ///
    /// Input validation runs before anything touches the signing key: an
    /// empty channel name never reaches the signer. Missing credentials
    /// fail closed instead of producing an unsigned token.
    pub fn mint(&self, channel_name: &str, uid: u32) -> Result<MintedToken> {
        if channel_name.is_empty() {
            return Err(Error::InvalidInput("Channel name is required".to_string()));
        }

        if !self.is_configured() {
            return Err(Error::Configuration(
                "Video provider credentials are not configured".to_string(),
            ));
        }

        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(i64::from(TOKEN_TTL_SECS));
        let expiry_ts = u32::try_from(expires_at.timestamp())
            .map_err(|_| Error::Internal("Token expiry outside encodable range".to_string()))?;

        let payload = encode_payload(expiry_ts, uid, ChannelRole::Publisher, channel_name);
        let signature = self.compute_signature(&payload)?;

        let mut body = Vec::with_capacity(SIGNATURE_LEN + payload.len());
        body.extend_from_slice(&signature);
        body.extend_from_slice(&payload);

        let token = format!(
            "{TOKEN_VERSION}{}{}",
            self.config.app_id,
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(body)
        );

        Ok(MintedToken {
            token,
            app_id: self.config.app_id.clone(),
            channel_name: channel_name.to_string(),
            uid,
            expires_at,
        })
    }

    /// Verify a token minted by this service and recover its fields.
    pub fn decode(&self, token: &str) -> Result<DecodedToken> {
        if !self.is_configured() {
            return Err(Error::Configuration(
                "Video provider credentials are not configured".to_string(),
            ));
        }

        let body = token
            .strip_prefix(TOKEN_VERSION)
            .and_then(|rest| rest.strip_prefix(self.config.app_id.as_str()))
            .ok_or_else(|| Error::InvalidInput("Unrecognized token format".to_string()))?;

        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| Error::InvalidInput("Malformed token payload".to_string()))?;

        // signature(32) + expiry(4) + uid(4) + role(1) + channel(>= 1)
        if bytes.len() < SIGNATURE_LEN + 10 {
            return Err(Error::InvalidInput("Truncated token payload".to_string()));
        }

        let (signature, payload) = bytes.split_at(SIGNATURE_LEN);
        let expected = self.compute_signature(payload)?;
        if signature != expected.as_slice() {
            return Err(Error::Authentication("Token signature mismatch".to_string()));
        }

        let expiry_ts = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let uid = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        let role = ChannelRole::from_byte(payload[8])
            .ok_or_else(|| Error::InvalidInput("Unknown channel role".to_string()))?;
        let channel_name = String::from_utf8(payload[9..].to_vec())
            .map_err(|_| Error::InvalidInput("Channel name is not valid UTF-8".to_string()))?;

        let expires_at = Utc
            .timestamp_opt(i64::from(expiry_ts), 0)
            .single()
            .ok_or_else(|| Error::Internal("Token expiry outside decodable range".to_string()))?;

        Ok(DecodedToken {
            channel_name,
            uid,
            role,
            expires_at,
        })
    }

    /// Compute HMAC-SHA256 over the app id and token payload
    fn compute_signature(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.config.app_certificate.as_bytes())
            .map_err(|e| Error::Internal(format!("Failed to create HMAC: {e}")))?;

        mac.update(self.config.app_id.as_bytes());
        mac.update(payload);

        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Validate provider configuration
    pub fn validate_config(&self) -> Result<()> {
        if self.config.app_id.is_empty() {
            return Err(Error::Configuration("Provider app id is empty".to_string()));
        }

        if self.config.app_certificate.is_empty() {
            return Err(Error::Configuration("Provider app certificate is empty".to_string()));
        }

        if self.config.app_certificate.len() < 32 {
            return Err(Error::Configuration(
                "Provider app certificate should be at least 32 characters".to_string(),
            ));
        }

        Ok(())
    }
}

fn encode_payload(expiry_ts: u32, uid: u32, role: ChannelRole, channel_name: &str) -> Vec<u8> {
    let channel = channel_name.as_bytes();
    let mut payload = Vec::with_capacity(9 + channel.len());
    payload.extend_from_slice(&expiry_ts.to_be_bytes());
    payload.extend_from_slice(&uid.to_be_bytes());
    payload.push(role as u8);
    payload.extend_from_slice(channel);
    payload
}

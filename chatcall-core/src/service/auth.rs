use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    models::{Identity, UserId},
    Error, Result,
};

/// Claims embedded in a signed bearer token.
///
/// Carries the full identity snapshot so call records never have to look
/// the user up in the chat application's store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    /// Login handle, used to address ringing notifications
    pub username: String,
    /// Display name
    pub name: String,
    /// Avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Unix timestamp the token was minted at
    pub iat: i64,
    /// Unix timestamp after which verification fails
    pub exp: i64,
}

impl Claims {
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity {
            id: UserId::from_string(self.sub.clone()),
            username: self.username.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
        }
    }
}

/// Signs and verifies the HS256 bearer tokens this service accepts.
///
/// The secret is shared with the chat application that performs the
/// actual login flow.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    algorithm: Algorithm,
    token_ttl: Duration,
}

// Manual Debug keeps the key material out of log output.
impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// Create a new JWT service with an HS256 shared secret
    pub fn new(secret: &str, token_ttl_hours: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Configuration("JWT secret is empty".to_string()));
        }

        Ok(Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            algorithm: Algorithm::HS256,
            token_ttl: Duration::hours(token_ttl_hours as i64),
        })
    }

    /// Sign a token carrying the given identity
    pub fn sign_token(&self, identity: &Identity) -> Result<String> {
        let now = Utc::now();

        let claims = Claims {
            sub: identity.id.as_str().to_string(),
            username: identity.username.clone(),
            name: identity.name.clone(),
            picture: identity.picture.clone(),
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };

        let header = Header::new(self.algorithm);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("Failed to sign token: {e}")))
    }

    /// Decode and validate a token, returning its claims
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 60; // tolerate a minute of clock skew

        let token_data: TokenData<Claims> = decode(token, &self.decoding_key, &validation)
            .map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;
                let msg = match e.kind() {
                    ErrorKind::ExpiredSignature => "Token has expired".to_string(),
                    ErrorKind::InvalidSignature => "Token signature mismatch".to_string(),
                    ErrorKind::InvalidToken => "Malformed token".to_string(),
                    _ => format!("Token rejected: {e}"),
                };
                Error::Authentication(msg)
            })?;

        Ok(token_data.claims)
    }
}

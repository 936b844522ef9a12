use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration, assembled from a file and the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub provider: ProviderConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

/// Bearer-token verification settings, shared with the chat application
/// that issues the tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: 24,
        }
    }
}

/// Video provider credentials used to mint channel access tokens.
///
/// Both fields empty means minting is disabled: the token endpoint
/// answers with an internal error instead of issuing unsigned tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub app_id: String,
    pub app_certificate: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_certificate: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long an unanswered call keeps ringing before it is evicted.
    pub pending_ttl_secs: u64,
    /// Interval of the background sweep that evicts expired pending calls.
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 60,
            sweep_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" for terminals, "json" for log collectors
    pub format: String,
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Build the configuration, layering sources so that environment
    /// variables beat the file and the file beats the serde defaults.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables. Sections are separated by a
        // double underscore so multi-word keys stay addressable, e.g.
        // CHATCALL_PROVIDER__APP_ID -> provider.app_id.
        builder = builder.add_source(
            Environment::with_prefix("CHATCALL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Environment-only load, for containerized deployments
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// The host:port the HTTP server binds
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Validate the configuration, collecting every problem instead of
    /// stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }

        if self.auth.jwt_secret.is_empty() {
            errors.push("auth.jwt_secret is required".to_string());
        } else if self.auth.jwt_secret.len() < 32 {
            errors.push("auth.jwt_secret must be at least 32 characters".to_string());
        }

        if self.auth.token_ttl_hours == 0 {
            errors.push("auth.token_ttl_hours must be at least 1".to_string());
        }

        // Provider credentials may be left empty (minting then fails closed),
        // but a half-configured pair is always a mistake.
        let id_set = !self.provider.app_id.is_empty();
        let cert_set = !self.provider.app_certificate.is_empty();
        if id_set != cert_set {
            errors.push(
                "provider.app_id and provider.app_certificate must be set together".to_string(),
            );
        }
        if cert_set && self.provider.app_certificate.len() < 32 {
            errors.push("provider.app_certificate must be at least 32 characters".to_string());
        }

        if self.registry.pending_ttl_secs < 5 || self.registry.pending_ttl_secs > 3600 {
            errors.push("registry.pending_ttl_secs must be between 5 and 3600".to_string());
        }
        if self.registry.sweep_interval_secs == 0 || self.registry.sweep_interval_secs > 600 {
            errors.push("registry.sweep_interval_secs must be between 1 and 600".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            auth: AuthConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                token_ttl_hours: 24,
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.registry.pending_ttl_secs, 60);
        assert_eq!(config.logging.level, "info");
        assert!(config.provider.app_id.is_empty());
    }

    #[test]
    fn test_http_address() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                http_port: 9090,
            },
            ..Config::default()
        };

        assert_eq!(config.http_address(), "127.0.0.1:9090");
    }

    #[test]
    fn test_validate_requires_jwt_secret() {
        let config = Config::default();

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("auth.jwt_secret")));
    }

    #[test]
    fn test_validate_rejects_short_jwt_secret() {
        let mut config = valid_config();
        config.auth.jwt_secret = "short".to_string();

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("at least 32 characters")));
    }

    #[test]
    fn test_validate_accepts_empty_provider_pair() {
        let config = valid_config();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_half_configured_provider() {
        let mut config = valid_config();
        config.provider.app_id = "app".to_string();

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("set together")));
    }

    #[test]
    fn test_validate_rejects_out_of_range_ttl() {
        let mut config = valid_config();
        config.registry.pending_ttl_secs = 0;

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("pending_ttl_secs")));
    }
}

//! Service initialization and dependency injection

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    service::{CallRegistry, JwtService, RtcTokenService, UserEventHub},
    Config,
};

/// Container for all initialized services
#[derive(Clone)]
pub struct Services {
    /// Bearer token verification
    pub jwt_service: JwtService,
    /// RTC channel token minting
    pub token_service: RtcTokenService,
    /// Call lifecycle state machine
    pub registry: Arc<CallRegistry>,
    /// Event fan-out to connected clients
    pub hub: UserEventHub,
}

/// Initialize all core services
pub fn init_services(config: &Config) -> Result<Services, anyhow::Error> {
    info!("Initializing services...");

    let jwt_service = JwtService::new(&config.auth.jwt_secret, config.auth.token_ttl_hours)?;
    info!("JWT service initialized");

    let token_service = RtcTokenService::new(config.provider.clone());
    if token_service.is_configured() {
        token_service.validate_config()?;
        info!("RTC token service initialized");
    } else {
        warn!("RTC token service has no provider credentials; token minting will fail closed");
    }

    let hub = UserEventHub::new();
    info!("User event hub initialized");

    let pending_ttl = chrono::Duration::seconds(config.registry.pending_ttl_secs as i64);
    let registry = Arc::new(CallRegistry::new(hub.clone(), pending_ttl));
    info!(
        pending_ttl_secs = config.registry.pending_ttl_secs,
        "Call registry initialized"
    );

    Ok(Services {
        jwt_service,
        token_service,
        registry,
        hub,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn test_config() -> Config {
        Config {
            auth: AuthConfig {
                jwt_secret: "unit-test-secret-0123456789abcdef".to_string(),
                token_ttl_hours: 24,
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_init_services_without_provider() {
        let services = init_services(&test_config()).unwrap();
        assert!(!services.token_service.is_configured());
        assert_eq!(services.registry.pending_count(), 0);
    }

    #[test]
    fn test_init_services_requires_jwt_secret() {
        let config = Config::default();
        assert!(init_services(&config).is_err());
    }
}

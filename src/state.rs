pub(crate) mod request_id;

use std::sync::Arc;

use crate::auth::{authenticate, build_allowed_key_set, AllowedClientKeys};
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::permission::PermissionCorrelator;
use crate::provider::ProviderRegistry;
use crate::routing::{ModelRouter, RoutingDefaults};
use crate::stream::SessionRegistry;
use crate::util::format_request_seq_hex;

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub router: ModelRouter,
    pub providers: ProviderRegistry,
    pub sessions: Arc<SessionRegistry>,
    pub permissions: Arc<PermissionCorrelator>,
    infra: InfraState,
}

struct InfraState {
    allowed_client_keys: AllowedClientKeys,
    request_ids: RequestIdGenerator,
}

impl AppState {
    /// Build state with the providers declared in `config`.
    #[must_use]
    pub fn from_config(config: AppConfig) -> Self {
        let providers = ProviderRegistry::from_config(&config.providers);
        Self::new(config, providers)
    }

    /// Build state around an explicit provider registry.
    #[must_use]
    pub fn new(config: AppConfig, providers: ProviderRegistry) -> Self {
        let router = ModelRouter::new(&config.routing);
        let permissions = Arc::new(PermissionCorrelator::new());
        let sessions = SessionRegistry::new(
            config.server.max_concurrent_streams,
            Arc::clone(&permissions),
        );
        let allowed_client_keys = build_allowed_key_set(&config);

        Self {
            config,
            router,
            providers,
            sessions,
            permissions,
            infra: InfraState {
                allowed_client_keys,
                request_ids: RequestIdGenerator::new(),
            },
        }
    }

    /// Authenticate a request using the prebuilt key index.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Auth` when the API key is missing or invalid.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), GatewayError> {
        authenticate(headers, &self.infra.allowed_client_keys)
    }

    pub fn next_request_seq(&self) -> u64 {
        self.infra.request_ids.next_seq()
    }

    /// A response id such as `msg_00000000000000a1`.
    #[must_use]
    pub fn response_id(&self, prefix: &str) -> String {
        format_request_seq_hex(prefix, self.next_request_seq())
    }

    /// Switch the default backend and cancel every active session, since
    /// their routing no longer reflects the configured default.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when a model is given without a provider, or the
    /// provider is not registered.
    pub fn set_default_backend(
        &self,
        provider_id: Option<String>,
        model_id: Option<String>,
    ) -> Result<RoutingDefaults, GatewayError> {
        if model_id.is_some() && provider_id.is_none() {
            return Err(GatewayError::InvalidRequest(
                "model_id requires provider_id".to_string(),
            ));
        }
        if let Some(provider) = provider_id.as_deref() {
            if !self.providers.contains(provider) {
                return Err(GatewayError::InvalidRequest(format!(
                    "Unknown provider '{provider}'"
                )));
            }
        }

        let defaults = RoutingDefaults {
            provider_id,
            model_id,
        };
        self.router.set_defaults(defaults.clone());
        let cancelled = self.sessions.cancel_all();
        tracing::info!(
            provider = ?defaults.provider_id,
            model = ?defaults.model_id,
            cancelled,
            "default backend changed"
        );
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_default_backend_cancels_sessions() {
        let state = AppState::from_config(AppConfig::default());
        let handle = state.sessions.admit(None, "echo", "echo-1").unwrap();

        let defaults = state
            .set_default_backend(Some("echo".into()), Some("echo-1".into()))
            .unwrap();
        assert_eq!(defaults.provider_id.as_deref(), Some("echo"));
        assert!(handle.cancel_token().is_cancelled());
        assert_eq!(state.router.defaults(), defaults);
    }

    #[test]
    fn test_set_default_backend_rejects_unknown_provider() {
        let state = AppState::from_config(AppConfig::default());
        assert!(matches!(
            state.set_default_backend(Some("ghost".into()), None),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(matches!(
            state.set_default_backend(None, Some("m".into())),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(state.set_default_backend(None, None).is_ok());
    }

    #[test]
    fn test_response_ids_are_unique() {
        let state = AppState::from_config(AppConfig::default());
        let a = state.response_id("msg_");
        let b = state.response_id("msg_");
        assert_ne!(a, b);
        assert!(a.starts_with("msg_"));
    }
}

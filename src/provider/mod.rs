//! Backend provider contract and the built-in providers.

pub mod echo;
pub mod scripted;

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::GatewayError;
use crate::permission::PermissionGate;
use crate::protocol::canonical::{AgentEvent, CanonicalMessage, ToolDefinition};

pub use echo::EchoProvider;
pub use scripted::{ScriptStep, ScriptedProvider};

/// What a provider is asked to generate.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub event_id: String,
    pub provider_id: String,
    pub model_id: String,
    pub messages: Vec<CanonicalMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u64>,
    pub temperature: Option<f64>,
}

/// Per-session handles a provider may use while producing events.
#[derive(Clone)]
pub struct SessionContext {
    pub event_id: String,
    /// Observed at every suspension point; once set, production stops.
    pub cancel: CancellationToken,
    pub permissions: PermissionGate,
}

/// A backend that turns canonical requests into canonical agent events.
///
/// Implementations translate their native stream shapes into
/// [`AgentEvent`]s before they reach the gateway core.
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    fn stream(
        &self,
        request: ProviderRequest,
        ctx: SessionContext,
    ) -> BoxStream<'static, AgentEvent>;

    fn list_models(&self) -> BoxFuture<'_, Result<Vec<String>, GatewayError>>;
}

struct ProviderSlot {
    provider: Arc<dyn Provider>,
    enabled: bool,
}

/// Providers by id, in declaration order.
#[derive(Default)]
pub struct ProviderRegistry {
    slots: FxHashMap<String, ProviderSlot>,
    order: Vec<String>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiate the built-in providers named in config.
    #[must_use]
    pub fn from_config(providers: &[ProviderConfig]) -> Self {
        let mut registry = Self::new();
        for cfg in providers {
            let provider: Arc<dyn Provider> = match &cfg.kind {
                ProviderKind::Echo {
                    chunk_chars,
                    chunk_delay_ms,
                } => Arc::new(EchoProvider::new(
                    cfg.id.clone(),
                    cfg.models.clone(),
                    *chunk_chars,
                    *chunk_delay_ms,
                )),
                ProviderKind::Scripted {
                    script,
                    list_models_error,
                } => Arc::new(
                    ScriptedProvider::new(cfg.id.clone(), cfg.models.clone(), script.clone())
                        .with_list_models_error(list_models_error.clone()),
                ),
            };
            tracing::debug!(provider = %cfg.id, kind = %cfg.kind, enabled = cfg.enabled, "provider registered");
            registry.register(provider, cfg.enabled);
        }
        registry
    }

    /// Add or replace a provider.
    pub fn register(&mut self, provider: Arc<dyn Provider>, enabled: bool) {
        let id = provider.id().to_string();
        if !self.slots.contains_key(&id) {
            self.order.push(id.clone());
        }
        self.slots.insert(id, ProviderSlot { provider, enabled });
    }

    /// Look up an enabled provider.
    ///
    /// # Errors
    ///
    /// Unknown or disabled providers are client errors.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Provider>, GatewayError> {
        match self.slots.get(id) {
            Some(slot) if slot.enabled => Ok(Arc::clone(&slot.provider)),
            Some(_) => Err(GatewayError::InvalidRequest(format!(
                "Provider '{id}' is disabled"
            ))),
            None => Err(GatewayError::InvalidRequest(format!(
                "Unknown provider '{id}'"
            ))),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Enabled providers in declaration order.
    #[must_use]
    pub fn enabled(&self) -> Vec<Arc<dyn Provider>> {
        self.order
            .iter()
            .filter_map(|id| self.slots.get(id))
            .filter(|slot| slot.enabled)
            .map(|slot| Arc::clone(&slot.provider))
            .collect()
    }
}

pub mod dispatch;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::config::RoutingConfig;
use crate::error::GatewayError;

/// The resolved `(provider, model)` pair for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTarget {
    pub provider_id: String,
    pub model_id: String,
}

impl RouteTarget {
    #[must_use]
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }
}

/// Model names every deployment knows about; config entries override them.
const BUILTIN_MODELS: &[(&str, &str, &str)] = &[
    ("echo", "echo", "echo-1"),
    ("gpt-4o", "openai", "gpt-4o"),
    ("gpt-4o-mini", "openai", "gpt-4o-mini"),
    ("claude-sonnet-4-5", "anthropic", "claude-sonnet-4-5"),
    ("claude-3-5-haiku-latest", "anthropic", "claude-3-5-haiku-latest"),
];

fn split_pair(model: &str, separator: char, trim: bool) -> Option<RouteTarget> {
    let (provider, model_id) = model.split_once(separator)?;
    let (provider, model_id) = if trim {
        (provider.trim(), model_id.trim())
    } else {
        (provider, model_id)
    };
    if provider.is_empty() || model_id.is_empty() {
        return None;
    }
    Some(RouteTarget::new(provider, model_id))
}

/// Resolve a client model string. First match wins:
///
/// 1. both defaults configured: the defaults, unconditionally
/// 2. `provider/model` split on the first `/`
/// 3. `provider,model` split on the first `,`, trimmed
/// 4. verbatim lookup in `table`
/// 5. default provider paired with the literal model string
///
/// A malformed pair (an empty side) falls through to the next rule.
#[must_use]
pub fn resolve_model(
    model: &str,
    default_provider_id: Option<&str>,
    default_model_id: Option<&str>,
    table: &FxHashMap<String, RouteTarget>,
) -> Option<RouteTarget> {
    if let (Some(provider), Some(model_id)) = (default_provider_id, default_model_id) {
        return Some(RouteTarget::new(provider, model_id));
    }
    if model.contains('/') {
        if let Some(target) = split_pair(model, '/', false) {
            return Some(target);
        }
    } else if model.contains(',') {
        if let Some(target) = split_pair(model, ',', true) {
            return Some(target);
        }
    }
    if let Some(target) = table.get(model) {
        return Some(target.clone());
    }
    default_provider_id.map(|provider| RouteTarget::new(provider, model))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutingDefaults {
    pub provider_id: Option<String>,
    pub model_id: Option<String>,
}

/// Model router holding the static table and the switchable default backend.
pub struct ModelRouter {
    table: FxHashMap<String, RouteTarget>,
    defaults: RwLock<RoutingDefaults>,
}

impl ModelRouter {
    #[must_use]
    pub fn new(config: &RoutingConfig) -> Self {
        let mut table: FxHashMap<String, RouteTarget> = BUILTIN_MODELS
            .iter()
            .map(|(name, provider, model)| ((*name).to_string(), RouteTarget::new(*provider, *model)))
            .collect();
        for (name, target) in &config.models {
            table.insert(
                name.clone(),
                RouteTarget::new(target.provider.clone(), target.model.clone()),
            );
        }
        Self {
            table,
            defaults: RwLock::new(RoutingDefaults {
                provider_id: config.default_provider_id.clone(),
                model_id: config.default_model_id.clone(),
            }),
        }
    }

    /// Resolve `model` against the current defaults and the table.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] when no rule matches.
    pub fn resolve(&self, model: &str) -> Result<RouteTarget, GatewayError> {
        let defaults = self.defaults.read();
        resolve_model(
            model,
            defaults.provider_id.as_deref(),
            defaults.model_id.as_deref(),
            &self.table,
        )
        .ok_or_else(|| {
            GatewayError::InvalidRequest(format!("No provider mapping found for model '{model}'"))
        })
    }

    #[must_use]
    pub fn defaults(&self) -> RoutingDefaults {
        self.defaults.read().clone()
    }

    /// Replace the default backend. Returns the previous defaults.
    pub fn set_defaults(&self, defaults: RoutingDefaults) -> RoutingDefaults {
        std::mem::replace(&mut *self.defaults.write(), defaults)
    }

    #[must_use]
    pub fn known_model_count(&self) -> usize {
        self.table.len()
    }
}

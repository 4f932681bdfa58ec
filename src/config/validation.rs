use std::collections::HashSet;

use super::{AppConfig, ConfigError, ProviderKind};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_api_keys(config)?;
    let provider_ids = validate_providers(config)?;
    validate_routing(config, &provider_ids)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_server_config(config: &AppConfig) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.port == 0 {
        return Err(validation_err("server.port must be greater than 0"));
    }
    if server.max_concurrent_streams == 0 {
        return Err(validation_err(
            "server.max_concurrent_streams must be greater than 0",
        ));
    }
    if server.request_body_limit_bytes == 0 {
        return Err(validation_err(
            "server.request_body_limit_bytes must be greater than 0",
        ));
    }
    if let Some(worker_threads) = server.runtime_worker_threads {
        if worker_threads == 0 {
            return Err(validation_err(
                "server.runtime_worker_threads must be greater than 0 when set",
            ));
        }
    }
    let base_path = server.base_path.trim();
    if !base_path.is_empty() && !base_path.starts_with('/') {
        return Err(validation_err("server.base_path must start with '/'"));
    }
    Ok(())
}

fn validate_api_keys(config: &AppConfig) -> Result<(), ConfigError> {
    if config.auth.api_keys.iter().any(|key| key.trim().is_empty()) {
        return Err(validation_err("auth.api_keys contains an empty key"));
    }
    Ok(())
}

fn validate_providers(config: &AppConfig) -> Result<HashSet<&str>, ConfigError> {
    let mut seen = HashSet::new();
    for provider in &config.providers {
        if provider.id.trim().is_empty() {
            return Err(validation_err("providers: id cannot be empty"));
        }
        if provider.id.contains('/') || provider.id.contains(',') {
            return Err(validation_err(format!(
                "Provider '{}': id cannot contain '/' or ','",
                provider.id
            )));
        }
        if !seen.insert(provider.id.as_str()) {
            return Err(validation_err(format!(
                "Duplicate provider id '{}'",
                provider.id
            )));
        }
        if let ProviderKind::Echo { chunk_chars, .. } = provider.kind {
            if chunk_chars == 0 {
                return Err(validation_err(format!(
                    "Provider '{}': chunk_chars must be greater than 0",
                    provider.id
                )));
            }
        }
    }
    Ok(seen)
}

fn validate_routing(config: &AppConfig, provider_ids: &HashSet<&str>) -> Result<(), ConfigError> {
    let routing = &config.routing;
    if routing.default_model_id.is_some() && routing.default_provider_id.is_none() {
        return Err(validation_err(
            "routing.default_model_id requires routing.default_provider_id",
        ));
    }
    if let Some(provider) = routing.default_provider_id.as_deref() {
        if !provider_ids.contains(provider) {
            return Err(validation_err(format!(
                "routing.default_provider_id '{provider}' is not a configured provider"
            )));
        }
    }
    for (name, target) in &routing.models {
        if name.trim().is_empty() {
            return Err(validation_err("routing.models contains an empty model name"));
        }
        if target.model.trim().is_empty() {
            return Err(validation_err(format!(
                "routing.models['{name}']: model cannot be empty"
            )));
        }
        if !provider_ids.contains(target.provider.as_str()) {
            return Err(validation_err(format!(
                "routing.models['{name}']: provider '{}' is not configured",
                target.provider
            )));
        }
    }
    Ok(())
}

const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let level = config.features.log_level.to_uppercase();
    if !VALID_LOG_LEVELS.contains(&level.as_str()) {
        return Err(validation_err(format!(
            "features.log_level '{}' is invalid. Must be one of: {}",
            config.features.log_level,
            VALID_LOG_LEVELS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelTarget, ProviderConfig};

    fn base() -> AppConfig {
        AppConfig::default()
    }

    fn assert_invalid(config: &AppConfig, needle: &str) {
        match validate_config(config) {
            Err(ConfigError::Validation(msg)) => {
                assert!(msg.contains(needle), "'{msg}' should mention '{needle}'");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        validate_config(&base()).unwrap();
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let mut config = base();
        config.server.max_concurrent_streams = 0;
        assert_invalid(&config, "max_concurrent_streams");
    }

    #[test]
    fn test_blank_api_key_rejected() {
        let mut config = base();
        config.auth.api_keys = vec!["ok".into(), "  ".into()];
        assert_invalid(&config, "empty key");
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let mut config = base();
        let dup: ProviderConfig = config.providers[0].clone();
        config.providers.push(dup);
        assert_invalid(&config, "Duplicate provider id");
    }

    #[test]
    fn test_default_provider_must_exist() {
        let mut config = base();
        config.routing.default_provider_id = Some("nope".into());
        assert_invalid(&config, "default_provider_id");
    }

    #[test]
    fn test_default_model_requires_provider() {
        let mut config = base();
        config.routing.default_model_id = Some("m".into());
        assert_invalid(&config, "requires");
    }

    #[test]
    fn test_model_table_provider_must_exist() {
        let mut config = base();
        config.routing.models.insert(
            "alias".into(),
            ModelTarget {
                provider: "ghost".into(),
                model: "m".into(),
            },
        );
        assert_invalid(&config, "ghost");
    }

    #[test]
    fn test_log_level_checked() {
        let mut config = base();
        config.features.log_level = "warning".into();
        validate_config(&config).unwrap();
        config.features.log_level = "LOUD".into();
        assert_invalid(&config, "log_level");
    }
}

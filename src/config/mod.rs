pub mod validation;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;
use crate::provider::scripted::ScriptStep;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_worker_threads: Option<usize>,
    #[serde(default = "default_request_body_limit_bytes")]
    pub request_body_limit_bytes: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_max_concurrent_streams() -> usize {
    10
}
fn default_request_body_limit_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            base_path: String::new(),
            max_concurrent_streams: default_max_concurrent_streams(),
            runtime_worker_threads: None,
            request_body_limit_bytes: default_request_body_limit_bytes(),
        }
    }
}

/// Client authentication. An empty key list disables authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// A concrete backend target for a model name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTarget {
    pub provider: String,
    pub model: String,
}

/// Model routing: configured defaults and the static model table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model_id: Option<String>,
    /// Merged over the built-in table; entries here win.
    #[serde(default)]
    pub models: BTreeMap<String, ModelTarget>,
}

/// Backend provider declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

/// Built-in provider implementations, selected by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    Echo {
        #[serde(default = "default_chunk_chars")]
        chunk_chars: usize,
        #[serde(default)]
        chunk_delay_ms: u64,
    },
    Scripted {
        #[serde(default)]
        script: Vec<ScriptStep>,
        /// When set, `list_models` fails with this message.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list_models_error: Option<String>,
    },
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Echo { .. } => write!(f, "echo"),
            ProviderKind::Scripted { .. } => write!(f, "scripted"),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_chunk_chars() -> usize {
    16
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![ProviderConfig {
        id: "echo".to_string(),
        enabled: true,
        models: vec!["echo-1".to_string()],
        kind: ProviderKind::Echo {
            chunk_chars: default_chunk_chars(),
            chunk_delay_ms: 0,
        },
    }]
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub features: FeaturesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            routing: RoutingConfig::default(),
            providers: default_providers(),
            features: FeaturesConfig::default(),
        }
    }
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.max_concurrent_streams, 10);
        assert_eq!(config.auth.api_keys.len(), 1);
        assert!(config.providers.iter().any(|p| p.id == "echo"));
        assert!(config
            .providers
            .iter()
            .any(|p| matches!(p.kind, ProviderKind::Scripted { .. })));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.server.max_concurrent_streams, 10);
        assert_eq!(config.server.request_body_limit_bytes, 2 * 1024 * 1024);
        assert!(config.auth.api_keys.is_empty());
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].kind.to_string(), "echo");
        assert_eq!(config.features.log_format, LogFormat::Text);
    }

    #[test]
    fn test_scripted_provider_parses() {
        let yaml = r#"
providers:
  - id: bot
    kind: scripted
    models: [bot-1]
    script:
      - text: "hello"
      - tool_start: { id: t1, name: ls }
      - tool_args: { id: t1, fragment: "{}" }
      - delay: 5
      - stop_reason: tool_use
      - hang
"#;
        let config = parse_config(yaml).unwrap();
        let ProviderKind::Scripted { script, .. } = &config.providers[0].kind else {
            panic!("expected scripted provider");
        };
        assert_eq!(script.len(), 6);
        assert_eq!(script[0], ScriptStep::Text("hello".into()));
        assert_eq!(script[5], ScriptStep::Hang);
    }
}

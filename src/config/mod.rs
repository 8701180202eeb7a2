pub mod validation;

use serde::{Deserialize, Serialize};

use self::validation::validate_config;

/// Environment variable that overrides the config file path.
pub const CONFIG_PATH_ENV: &str = "CHATBRIDGE_CONFIG";
/// Config file path used when the environment variable is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

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
    /// Upstream request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub base_path: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_timeout() -> u64 {
    180
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout: default_timeout(),
            base_path: String::new(),
        }
    }
}

/// Backend chat service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub base_url: String,
    /// Opaque bearer token presented to the backend.
    #[serde(default)]
    pub api_key: String,
    /// Serve requests from the scripted mock transport instead of HTTP.
    #[serde(default)]
    pub mock: bool,
    /// Fixed delay between mock events, in milliseconds.
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
}

fn default_mock_delay_ms() -> u64 {
    20
}

// An absent `upstream` section runs against the mock transport.
impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            mock: true,
            mock_delay_ms: default_mock_delay_ms(),
        }
    }
}

/// Instructions folded into the first user turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionsConfig {
    #[serde(default)]
    pub default: Option<String>,
    /// Prepend `default` to request-supplied instructions instead of
    /// replacing it.
    #[serde(default)]
    pub append: bool,
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Model name reported when a request does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}
fn default_model() -> String {
    "backend-chat".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            default_model: default_model(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub instructions: InstructionsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
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

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] or [`ConfigError::Validation`].
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Resolve the config path from the environment, falling back to
/// [`DEFAULT_CONFIG_PATH`].
#[must_use]
pub fn config_path_from_env() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
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
        assert!(!config.upstream.mock);
        assert_eq!(config.upstream.mock_delay_ms, 20);
        assert!(config.instructions.default.is_some());
        assert!(!config.instructions.append);
        assert_eq!(config.features.default_model, "backend-chat");
    }

    #[test]
    fn test_minimal_config_defaults_to_mock() {
        let config = parse_config("{}").unwrap();
        assert!(config.upstream.mock);
        assert_eq!(config.server.timeout, 180);
        assert_eq!(config.features.log_level, "INFO");
        assert_eq!(config.instructions, InstructionsConfig::default());
    }

    #[test]
    fn test_instructions_parse() {
        let config = parse_config(
            "instructions:\n  default: \"Be terse\"\n  append: true\n",
        )
        .unwrap();
        assert_eq!(config.instructions.default.as_deref(), Some("Be terse"));
        assert!(config.instructions.append);
    }

    #[test]
    fn test_invalid_yaml_is_reported() {
        assert!(matches!(
            parse_config("server: [1, 2"),
            Err(ConfigError::Yaml(_))
        ));
    }
}

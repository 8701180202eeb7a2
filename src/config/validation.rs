use super::{AppConfig, ConfigError};

/// Upper bound for `upstream.mock_delay_ms`.
const MAX_MOCK_DELAY_MS: u64 = 60_000;

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_server_config(config)?;
    validate_upstream(config)?;
    validate_log_level(config)?;
    validate_features(config)?;
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
    if server.timeout == 0 {
        return Err(validation_err("server.timeout must be greater than 0"));
    }
    if !server.base_path.is_empty() && !server.base_path.starts_with('/') {
        return Err(validation_err("server.base_path must start with '/'"));
    }
    Ok(())
}

fn validate_upstream(config: &AppConfig) -> Result<(), ConfigError> {
    let upstream = &config.upstream;
    if upstream.mock_delay_ms > MAX_MOCK_DELAY_MS {
        return Err(validation_err(format!(
            "upstream.mock_delay_ms must not exceed {MAX_MOCK_DELAY_MS}"
        )));
    }
    if upstream.mock {
        return Ok(());
    }
    let base_url = upstream.base_url.trim();
    if base_url.is_empty() {
        return Err(validation_err(
            "upstream.base_url is required unless upstream.mock is enabled",
        ));
    }
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(validation_err(format!(
            "upstream.base_url must use http or https: {base_url}"
        )));
    }
    Ok(())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = [
        "DEBUG", "INFO", "WARNING", "WARN", "ERROR", "CRITICAL", "DISABLED",
    ];
    if !valid_levels.contains(&config.features.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_features(config: &AppConfig) -> Result<(), ConfigError> {
    if config.features.default_model.trim().is_empty() {
        return Err(validation_err("features.default_model must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn make_valid_config() -> AppConfig {
        AppConfig {
            server: ServerConfig::default(),
            upstream: UpstreamConfig {
                base_url: "https://chat.internal.example/v1/stream".to_string(),
                api_key: "token".to_string(),
                mock: false,
                mock_delay_ms: 20,
            },
            instructions: InstructionsConfig::default(),
            features: FeaturesConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&make_valid_config()).is_ok());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_port() {
        let mut config = make_valid_config();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_base_path_without_leading_slash() {
        let mut config = make_valid_config();
        config.server.base_path = "api".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_missing_base_url() {
        let mut config = make_valid_config();
        config.upstream.base_url = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_missing_base_url_allowed_in_mock_mode() {
        let mut config = make_valid_config();
        config.upstream.base_url.clear();
        config.upstream.mock = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_base_url_scheme() {
        let mut config = make_valid_config();
        config.upstream.base_url = "ftp://bad.url".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_mock_delay_limit() {
        let mut config = make_valid_config();
        config.upstream.mock_delay_ms = MAX_MOCK_DELAY_MS;
        assert!(validate_config(&config).is_ok());
        config.upstream.mock_delay_ms = MAX_MOCK_DELAY_MS + 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_log_levels() {
        let mut config = make_valid_config();
        for level in ["debug", "Warning", "WARN", "critical", "DISABLED"] {
            config.features.log_level = level.to_string();
            assert!(validate_config(&config).is_ok(), "level {level}");
        }
        config.features.log_level = "LOUD".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_empty_default_model() {
        let mut config = make_valid_config();
        config.features.default_model = String::new();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("default_model"));
    }
}

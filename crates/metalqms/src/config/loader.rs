use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::{Config, RetryPolicyConfig};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let mut seen = HashSet::new();
    for backend in &config.extraction.backends {
        if !seen.insert(backend) {
            return Err(ConfigError::Validation {
                message: format!("Extraction backend {:?} listed twice", backend),
            });
        }
    }

    for (step, policy) in [
        ("extraction", &config.retry.extraction),
        ("indexing", &config.retry.indexing),
        ("preview", &config.retry.preview),
    ] {
        validate_retry_policy(step, policy)?;
    }

    if config.search.suggestions_per_field > config.search.max_suggestions {
        return Err(ConfigError::Validation {
            message: "search.suggestions_per_field exceeds search.max_suggestions".to_string(),
        });
    }

    let notifications = &config.notifications;
    if notifications.enabled
        && !notifications.api_base_url.starts_with("https://")
        && !notifications.api_base_url.starts_with("http://")
    {
        return Err(ConfigError::Validation {
            message: format!(
                "notifications.api_base_url must be an http(s) URL, got '{}'",
                notifications.api_base_url
            ),
        });
    }

    Ok(())
}

fn validate_retry_policy(step: &str, policy: &RetryPolicyConfig) -> Result<(), ConfigError> {
    if policy.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: format!("retry.{}.max_attempts must be at least 1", step),
        });
    }
    if policy.max_delay_secs < policy.base_delay_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "retry.{}.max_delay_secs ({}) is below base_delay_secs ({})",
                step, policy.max_delay_secs, policy.base_delay_secs
            ),
        });
    }
    Ok(())
}

//! Secret resolution for the messaging bot token.
//!
//! Sources are tried in order: a direct value in the config file, a file
//! holding the secret (Docker secrets), then an environment variable.

use std::fs;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::config::NotificationsConfig;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: direct value, file path, or env var name)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Secret file '{0}' is empty")]
    EmptyFile(PathBuf),

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

/// Resolves a secret from the first non-empty source.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString, SecretError> {
    let non_empty = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(String::from);

    if let Some(value) = non_empty(direct) {
        return Ok(SecretString::from(value));
    }

    if let Some(path) = non_empty(file_path) {
        let path = expand_home(&path);
        let content = fs::read_to_string(&path).map_err(|e| SecretError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        let content = content.trim();
        if content.is_empty() {
            return Err(SecretError::EmptyFile(path));
        }
        return Ok(SecretString::from(content.to_string()));
    }

    if let Some(name) = non_empty(env_var) {
        return match std::env::var(&name) {
            Ok(value) if !value.trim().is_empty() => Ok(SecretString::from(value.trim())),
            Ok(_) | Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet { name }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode { name }),
        };
    }

    Err(SecretError::NoSourceProvided)
}

/// Resolves the bot token configured in the notifications section.
pub fn resolve_bot_token(config: &NotificationsConfig) -> Result<SecretString, SecretError> {
    resolve_secret(
        config.bot_token.as_deref(),
        config.bot_token_file.as_deref(),
        Some(config.bot_token_env_var.as_str()),
    )
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

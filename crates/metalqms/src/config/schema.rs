use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite file; defaults to `~/.metalqms/data/metalqms.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Root directory for uploaded certificate files.
    pub storage_directory: String,
    /// Thumbnail directory; defaults to `<storage_directory>/previews`.
    #[serde(default)]
    pub preview_directory: Option<String>,
    /// Public URL prefix under which thumbnails are served.
    #[serde(default = "default_media_url")]
    pub media_url: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub max_upload_bytes: Option<u64>,
    #[serde(default = "default_stale_processing_minutes")]
    pub stale_processing_minutes: u64,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

fn default_media_url() -> String {
    "/media/certificates/previews".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_stale_processing_minutes() -> u64 {
    30
}

impl Config {
    /// Configuration with every optional setting at its default.
    pub fn with_storage(storage_directory: impl Into<String>) -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            storage_directory: storage_directory.into(),
            preview_directory: None,
            media_url: default_media_url(),
            worker_count: default_worker_count(),
            max_upload_bytes: None,
            stale_processing_minutes: default_stale_processing_minutes(),
            extraction: ExtractionConfig::default(),
            preview: PreviewConfig::default(),
            retry: RetryConfig::default(),
            search: SearchConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }

    pub fn storage_directory(&self) -> &Path {
        Path::new(&self.storage_directory)
    }

    pub fn preview_directory(&self) -> PathBuf {
        match &self.preview_directory {
            Some(dir) => PathBuf::from(dir),
            None => self.storage_directory().join("previews"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionBackendKind {
    Lopdf,
    Pdftotext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_backends")]
    pub backends: Vec<ExtractionBackendKind>,
    /// A backend result with fewer non-whitespace characters falls through
    /// to the next backend.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
    #[serde(default = "default_extraction_timeout")]
    pub timeout_secs: u64,
}

fn default_backends() -> Vec<ExtractionBackendKind> {
    vec![ExtractionBackendKind::Lopdf, ExtractionBackendKind::Pdftotext]
}

fn default_min_text_chars() -> usize {
    50
}

fn default_extraction_timeout() -> u64 {
    120
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            min_text_chars: default_min_text_chars(),
            timeout_secs: default_extraction_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_max_height")]
    pub max_height: u32,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default = "default_preview_timeout")]
    pub timeout_secs: u64,
    /// When set, a certificate whose preview cannot be generated ends up
    /// `failed` instead of `completed`.
    #[serde(default)]
    pub required: bool,
}

fn default_max_width() -> u32 {
    300
}

fn default_max_height() -> u32 {
    400
}

fn default_dpi() -> u32 {
    72
}

fn default_preview_timeout() -> u64 {
    60
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            max_height: default_max_height(),
            dpi: default_dpi(),
            timeout_secs: default_preview_timeout(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_extraction_retry")]
    pub extraction: RetryPolicyConfig,
    #[serde(default = "default_indexing_retry")]
    pub indexing: RetryPolicyConfig,
    #[serde(default = "default_preview_retry")]
    pub preview: RetryPolicyConfig,
}

fn default_extraction_retry() -> RetryPolicyConfig {
    RetryPolicyConfig {
        max_attempts: 3,
        base_delay_secs: 60,
        max_delay_secs: 600,
    }
}

fn default_indexing_retry() -> RetryPolicyConfig {
    RetryPolicyConfig {
        max_attempts: 3,
        base_delay_secs: 30,
        max_delay_secs: 300,
    }
}

fn default_preview_retry() -> RetryPolicyConfig {
    RetryPolicyConfig {
        max_attempts: 2,
        base_delay_secs: 60,
        max_delay_secs: 600,
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            extraction: default_extraction_retry(),
            indexing: default_indexing_retry(),
            preview: default_preview_retry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,
    #[serde(default = "default_suggestions_per_field")]
    pub suggestions_per_field: usize,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

fn default_max_results() -> usize {
    50
}

fn default_min_query_chars() -> usize {
    2
}

fn default_suggestions_per_field() -> usize {
    10
}

fn default_max_suggestions() -> usize {
    20
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            min_query_chars: default_min_query_chars(),
            suggestions_per_field: default_suggestions_per_field(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub bot_token_file: Option<String>,
    #[serde(default = "default_bot_token_env_var")]
    pub bot_token_env_var: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Users that also receive alerts about failed certificate processing.
    #[serde(default)]
    pub admin_user_ids: Vec<i64>,
}

fn default_bot_token_env_var() -> String {
    "METALQMS_TELEGRAM_BOT_TOKEN".to_string()
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_rate_limit() -> u32 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_delay() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            bot_token_file: None,
            bot_token_env_var: default_bot_token_env_var(),
            api_base_url: default_api_base_url(),
            rate_limit_per_second: default_rate_limit(),
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base_delay(),
            timeout_secs: default_request_timeout(),
            admin_user_ids: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::with_storage("/srv/certs");
        assert_eq!(config.preview.max_width, 300);
        assert_eq!(config.preview.max_height, 400);
        assert!(!config.preview.required);
        assert_eq!(config.search.max_results, 50);
        assert_eq!(config.notifications.rate_limit_per_second, 30);
        assert_eq!(config.notifications.max_retries, 5);
        assert_eq!(
            config.extraction.backends,
            vec![ExtractionBackendKind::Lopdf, ExtractionBackendKind::Pdftotext]
        );
        assert!(config.worker_count >= 1);
    }

    #[test]
    fn test_derived_paths() {
        let mut config = Config::with_storage("/srv/certs");
        assert_eq!(config.preview_directory(), PathBuf::from("/srv/certs/previews"));

        config.preview_directory = Some("/srv/thumbs".to_string());
        config.database_path = Some("/srv/qms.db".to_string());
        assert_eq!(config.preview_directory(), PathBuf::from("/srv/thumbs"));
        assert_eq!(config.database_path(), Some(PathBuf::from("/srv/qms.db")));
    }

    #[test]
    fn test_backend_kind_serde() {
        let kinds: Vec<ExtractionBackendKind> =
            serde_json::from_str(r#"["pdftotext", "lopdf"]"#).unwrap();
        assert_eq!(
            kinds,
            vec![ExtractionBackendKind::Pdftotext, ExtractionBackendKind::Lopdf]
        );
    }
}

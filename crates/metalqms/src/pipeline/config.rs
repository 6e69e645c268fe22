use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

use super::retry::RetryPolicy;

/// Settings the orchestrator needs, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub storage_directory: PathBuf,
    pub preview_directory: PathBuf,
    pub extraction_timeout: Duration,
    pub preview_timeout: Duration,
    pub preview_required: bool,
    pub extraction_retry: RetryPolicy,
    pub indexing_retry: RetryPolicy,
    pub preview_retry: RetryPolicy,
    pub stale_after: Duration,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            storage_directory: config.storage_directory().to_path_buf(),
            preview_directory: config.preview_directory(),
            extraction_timeout: Duration::from_secs(config.extraction.timeout_secs),
            preview_timeout: Duration::from_secs(config.preview.timeout_secs),
            preview_required: config.preview.required,
            extraction_retry: RetryPolicy::from_config(&config.retry.extraction),
            indexing_retry: RetryPolicy::from_config(&config.retry.indexing),
            preview_retry: RetryPolicy::from_config(&config.retry.preview),
            stale_after: Duration::from_secs(config.stale_processing_minutes * 60),
        }
    }
}

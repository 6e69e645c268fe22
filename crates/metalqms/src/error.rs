use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetalQmsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Preview error: {0}")]
    Preview(#[from] PreviewError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Notification error: {0}")]
    Dispatch(#[from] crate::notify::DispatchError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Certificate {0} not found")]
    CertificateNotFound(i64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Not a PDF document (missing %PDF header)")]
    NotPdf,

    #[error("Failed to read certificate file '{path}': {message}")]
    Read { path: PathBuf, message: String },

    #[error("Backend '{backend}' failed: {message}")]
    Backend { backend: String, message: String },

    #[error("All extraction backends failed: {0}")]
    AllBackendsFailed(String),

    #[error("No text could be extracted from the document")]
    NoText,

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),
}

impl ExtractionError {
    /// Whether another attempt on the same bytes could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractionError::Backend { .. }
                | ExtractionError::AllBackendsFailed(_)
                | ExtractionError::Timeout(_)
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreviewError {
    #[error("Cannot open PDF for preview: {0}")]
    InvalidDocument(String),

    #[error("PDF has no pages")]
    NoPages,

    #[error("Rendering failed: {0}")]
    Render(String),

    #[error("Thumbnail encoding failed: {0}")]
    Image(String),

    #[error("Preview rendering timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to store thumbnail: {0}")]
    Write(String),
}

impl PreviewError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PreviewError::Render(_) | PreviewError::Timeout(_) | PreviewError::Write(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Failed to persist search index: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Failed to serialize certificate fields: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IndexingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexingError::Database(_))
    }
}

/// Failure of the outbound messaging transport, classified by whether a
/// retry can help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network error, timeout, throttling or server-side failure.
    #[error("Transient transport failure: {0}")]
    Transient(String),

    /// The recipient blocked the bot or the chat is forbidden.
    #[error("Recipient unreachable: {0}")]
    Permanent(String),

    /// The request itself was rejected as invalid.
    #[error("Malformed request: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Uploaded file is not a PDF")]
    NotPdf,

    #[error("Uploaded file is {size} bytes, limit is {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("Could not find a free file name for '{0}'")]
    NameExhausted(String),
}

pub type Result<T> = std::result::Result<T, MetalQmsError>;

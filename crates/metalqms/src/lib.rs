pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extractor;
pub mod index;
pub mod notify;
pub mod pipeline;
pub mod preview;
pub mod process;
pub mod sanitize;
pub mod secrets;
pub mod storage;
pub mod worker;

pub use clock::{Clock, ManualClock, RecordingSleeper, Sleeper, SystemClock, ThreadSleeper};
pub use config::{load_config, Config};
pub use db::Database;
pub use error::{
    ConfigError, ExtractionError, IndexingError, MetalQmsError, PreviewError, Result, StorageError,
    TransportError,
};
pub use extractor::{CertificateFields, Extractor};
pub use index::{Indexer, SearchQuery, SearchResult, SearchService, Suggestion, SuggestionField};
pub use notify::{Dispatcher, NotificationCategory, NotificationRequest};
pub use pipeline::{Orchestrator, PipelineConfig, ProcessingOutcome, ProcessingReport, RetryPolicy};
pub use preview::PreviewGenerator;
pub use secrets::{resolve_bot_token, resolve_secret, SecretError};
pub use storage::CertificateStore;
pub use worker::{run_batch, BatchReport};

//! Certificate processing: status machine, retried steps and the
//! orchestrator tying extraction, indexing and preview generation together.

pub mod config;
pub mod error;
pub mod listener;
pub mod retry;
pub mod runner;
pub mod status;
pub mod timeout;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use listener::{NoopListener, NotifyingListener, ProcessingListener};
pub use retry::{RetryError, RetryPolicy, Retryable};
pub use runner::{Orchestrator, ProcessingOutcome, ProcessingReport, Step, STALE_PROCESSING_MESSAGE};
pub use status::{InvalidTransition, ProcessingStatus, Transition};

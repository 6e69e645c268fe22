use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration as ChronoDuration;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, info_span, warn};

use crate::clock::{Clock, Sleeper, SystemClock, ThreadSleeper};
use crate::config::Config;
use crate::db::certificate_repo::{self, CertificateRow};
use crate::db::index_repo::{self, TransitionOutcome};
use crate::db::processing_log_repo::{self, AttemptStatus, LogEntry, Operation};
use crate::db::{preview_repo, Database};
use crate::error::{ExtractionError, PreviewError};
use crate::extractor::{CertificateFields, ExtractedText, Extractor};
use crate::index::Indexer;
use crate::preview::{PreviewGenerator, Thumbnail};
use crate::sanitize;

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::listener::{NoopListener, ProcessingListener};
use super::retry::RetryError;
use super::status::{ProcessingStatus, Transition};
use super::timeout::{run_with_timeout, TimeoutError};

/// Message stored on certificates whose claim outlived the stale limit.
pub const STALE_PROCESSING_MESSAGE: &str = "processing timed out";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Extraction,
    Indexing,
    Preview,
}

impl Step {
    fn operation(self) -> Operation {
        match self {
            Step::Extraction => Operation::TextExtraction,
            Step::Indexing => Operation::SearchIndexing,
            Step::Preview => Operation::PreviewGeneration,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Completed,
    /// Indexed, but the thumbnail could not be generated.
    CompletedWithoutPreview { preview_error: String },
    Failed { step: Step, error: String },
    /// Already completed and not forced.
    Skipped,
    /// Another worker holds the claim.
    Busy,
    /// The claim was released underneath this run (stale recovery), so
    /// its result was not recorded.
    ClaimLost { status: Option<ProcessingStatus> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingReport {
    pub certificate_id: i64,
    #[serde(flatten)]
    pub outcome: ProcessingOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_backend: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<CertificateFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<PathBuf>,
    pub duration_ms: u64,
}

impl ProcessingReport {
    fn new(certificate_id: i64, outcome: ProcessingOutcome) -> Self {
        Self {
            certificate_id,
            outcome,
            text_backend: None,
            fields: None,
            thumbnail_path: None,
            duration_ms: 0,
        }
    }
}

/// Drives a certificate through extraction, indexing and preview
/// generation, each step under its own retry policy.
pub struct Orchestrator {
    db: Database,
    config: Arc<PipelineConfig>,
    extractor: Arc<Extractor>,
    previews: Arc<PreviewGenerator>,
    indexer: Indexer,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    listener: Arc<dyn ProcessingListener>,
}

impl Orchestrator {
    /// Production constructor: real backends, system clock, thread sleeps.
    pub fn from_config(db: Database, config: &Config) -> Self {
        let extractor = Extractor::from_config(&config.extraction);
        info!(backends = ?extractor.backend_names(), "extraction backends configured");
        Self::new(
            db,
            Arc::new(PipelineConfig::from_config(config)),
            Arc::new(extractor),
            Arc::new(PreviewGenerator::from_config(&config.preview)),
            Arc::new(SystemClock),
            Arc::new(ThreadSleeper),
        )
    }

    /// Injection constructor.
    pub fn new(
        db: Database,
        config: Arc<PipelineConfig>,
        extractor: Arc<Extractor>,
        previews: Arc<PreviewGenerator>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            indexer: Indexer::new(db.clone()),
            db,
            config,
            extractor,
            previews,
            clock,
            sleeper,
            listener: Arc::new(NoopListener),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProcessingListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Processes one certificate. Completed certificates are skipped unless
    /// `force` is set; failed ones are reset and processed again.
    pub fn process(&self, certificate_id: i64, force: bool) -> Result<ProcessingReport, PipelineError> {
        let started = Instant::now();
        let certificate = certificate_repo::find_by_id(&self.db, certificate_id)?
            .ok_or(PipelineError::CertificateNotFound(certificate_id))?;

        let _span = info_span!("certificate",
            certificate_id,
            file = %sanitize::redact_path(Path::new(&certificate.original_filename)),
        )
        .entered();

        if let Some(outcome) = self.claim(certificate_id, force)? {
            debug!(?outcome, "certificate not claimed");
            return Ok(ProcessingReport::new(certificate_id, outcome));
        }

        let mut report = ProcessingReport::new(certificate_id, ProcessingOutcome::Completed);
        let outcome = self.run_steps(&certificate, &mut report)?;
        report.outcome = outcome;
        report.duration_ms = started.elapsed().as_millis() as u64;

        match &report.outcome {
            ProcessingOutcome::Failed { step, error } => {
                error!(?step, error = %error, "certificate processing failed")
            }
            ProcessingOutcome::CompletedWithoutPreview { preview_error } => {
                warn!(error = %preview_error, "certificate indexed without preview")
            }
            ProcessingOutcome::ClaimLost { status } => {
                warn!(?status, "processing claim lost before the result was recorded");
                return Ok(report);
            }
            _ => info!(duration_ms = report.duration_ms, "certificate processed"),
        }

        self.listener.on_finished(&certificate, &report);
        Ok(report)
    }

    /// Fails certificates stuck in `processing` for longer than the stale
    /// limit and returns their ids.
    pub fn recover_stale(&self) -> Result<Vec<i64>, PipelineError> {
        let now = self.clock.now();
        let stale_after =
            ChronoDuration::from_std(self.config.stale_after).unwrap_or(ChronoDuration::zero());
        let mut recovered = Vec::new();

        for id in index_repo::stale_processing(&self.db, now - stale_after)? {
            let outcome =
                index_repo::transition(&self.db, id, Transition::Fail, Some(STALE_PROCESSING_MESSAGE), now)?;
            if outcome.is_applied() {
                warn!(certificate_id = id, "stale processing claim released");
                recovered.push(id);
            }
        }
        Ok(recovered)
    }

    /// Moves the certificate to `processing`. Returns the outcome to report
    /// when it must not be processed.
    fn claim(&self, id: i64, force: bool) -> Result<Option<ProcessingOutcome>, PipelineError> {
        let now = self.clock.now();
        index_repo::ensure_entry(&self.db, id, now)?;

        match index_repo::status_of(&self.db, id)? {
            None => return Err(PipelineError::CertificateNotFound(id)),
            Some(ProcessingStatus::Processing) => return Ok(Some(ProcessingOutcome::Busy)),
            Some(ProcessingStatus::Completed) if !force => return Ok(Some(ProcessingOutcome::Skipped)),
            Some(ProcessingStatus::Completed) | Some(ProcessingStatus::Failed) => {
                let outcome = index_repo::transition(&self.db, id, Transition::Reprocess { force }, None, now)?;
                if !outcome.is_applied() {
                    return Ok(Some(ProcessingOutcome::Busy));
                }
            }
            Some(ProcessingStatus::Pending) => {}
        }

        match index_repo::transition(&self.db, id, Transition::Start, None, now)? {
            TransitionOutcome::Applied { .. } => Ok(None),
            TransitionOutcome::Rejected(_) => Ok(Some(ProcessingOutcome::Busy)),
            TransitionOutcome::Missing => Err(PipelineError::CertificateNotFound(id)),
        }
    }

    fn run_steps(
        &self,
        certificate: &CertificateRow,
        report: &mut ProcessingReport,
    ) -> Result<ProcessingOutcome, PipelineError> {
        let id = certificate.id;

        let extracted = {
            let _step = info_span!("extraction").entered();
            match self.step_extract(certificate) {
                Ok(extracted) => extracted,
                Err(e) => return self.fail(id, Step::Extraction, e.error.to_string()),
            }
        };
        report.text_backend = Some(extracted.backend);
        let fields = self.extractor.parse_fields(&extracted.text);

        {
            let _step = info_span!("indexing").entered();
            if let Err(e) = self.step_index(id, &extracted.text, &fields) {
                return self.fail(id, Step::Indexing, e.error.to_string());
            }
        }
        report.fields = Some(fields);

        let preview_error = {
            let _step = info_span!("preview").entered();
            match self.step_preview(certificate) {
                Ok(path) => {
                    report.thumbnail_path = Some(path);
                    None
                }
                Err(e) => Some(e.error.to_string()),
            }
        };

        match preview_error {
            Some(error) if self.config.preview_required => self.fail(id, Step::Preview, error),
            preview_error => {
                let outcome = match preview_error {
                    Some(preview_error) => ProcessingOutcome::CompletedWithoutPreview { preview_error },
                    None => ProcessingOutcome::Completed,
                };
                self.finish(id, Transition::Complete, None, outcome)
            }
        }
    }

    fn step_extract(&self, certificate: &CertificateRow) -> Result<ExtractedText, RetryError<ExtractionError>> {
        let path = self.resolve_path(&certificate.file_path);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                let error = ExtractionError::Read {
                    path: PathBuf::from(sanitize::redact_path(&path)),
                    message: e.to_string(),
                };
                self.log_attempt(certificate.id, Step::Extraction, 1, 0, Err(&error), json!({}));
                return Err(RetryError { error, attempts: 1 });
            }
        };

        let timeout = self.config.extraction_timeout;
        self.config.extraction_retry.execute(self.sleeper.as_ref(), |attempt| {
            let started = Instant::now();
            let extractor = Arc::clone(&self.extractor);
            let pdf = Arc::clone(&bytes);

            let result = run_with_timeout(timeout, move || extractor.extract_text(&pdf))
                .unwrap_or_else(|e| Err(timeout_to_extraction(e)))
                .and_then(|text| {
                    if text.significant_chars() == 0 {
                        Err(ExtractionError::NoText)
                    } else {
                        Ok(text)
                    }
                });

            let metadata = match &result {
                Ok(text) => json!({ "backend": text.backend, "chars": text.text.chars().count() }),
                Err(_) => json!({}),
            };
            self.log_attempt(
                certificate.id,
                Step::Extraction,
                attempt,
                elapsed_ms(started),
                result.as_ref().map(|_| ()),
                metadata,
            );
            result
        })
    }

    fn step_index(
        &self,
        id: i64,
        text: &str,
        fields: &CertificateFields,
    ) -> Result<(), RetryError<crate::error::IndexingError>> {
        self.config.indexing_retry.execute(self.sleeper.as_ref(), |attempt| {
            let started = Instant::now();
            let result = self.indexer.upsert(id, text, fields, self.clock.now());
            self.log_attempt(
                id,
                Step::Indexing,
                attempt,
                elapsed_ms(started),
                result.as_ref().map(|_| ()),
                json!({ "grade": fields.grade, "heat_number": fields.heat_number }),
            );
            result
        })
    }

    fn step_preview(&self, certificate: &CertificateRow) -> Result<PathBuf, RetryError<PreviewError>> {
        let id = certificate.id;
        if let Err(e) = preview_repo::mark_generating(&self.db, id, self.clock.now()) {
            warn!(error = %e, "could not mark preview as generating");
        }

        let path = self.resolve_path(&certificate.file_path);
        let timeout = self.config.preview_timeout;

        let result = self.config.preview_retry.execute(self.sleeper.as_ref(), |attempt| {
            let started = Instant::now();
            let result = std::fs::read(&path)
                .map_err(|e| PreviewError::Render(format!("Failed to read certificate: {}", e)))
                .and_then(|bytes| {
                    let previews = Arc::clone(&self.previews);
                    run_with_timeout(timeout, move || previews.generate(&bytes))
                        .unwrap_or_else(|e| Err(timeout_to_preview(e)))
                })
                .and_then(|thumbnail: Thumbnail| {
                    let saved = thumbnail.save(&self.config.preview_directory, id)?;
                    Ok((saved, thumbnail.width, thumbnail.height))
                });

            let metadata = match &result {
                Ok((_, width, height)) => json!({ "width": width, "height": height }),
                Err(_) => json!({}),
            };
            self.log_attempt(
                id,
                Step::Preview,
                attempt,
                elapsed_ms(started),
                result.as_ref().map(|_| ()),
                metadata,
            );
            result
        });

        let now = self.clock.now();
        let recorded = match &result {
            Ok((saved, width, height)) => preview_repo::mark_completed(
                &self.db,
                id,
                &saved.to_string_lossy(),
                *width,
                *height,
                now,
            ),
            Err(e) => preview_repo::mark_failed(&self.db, id, &e.error.to_string(), now),
        };
        if let Err(e) = recorded {
            warn!(error = %e, "could not record preview status");
        }

        result.map(|(saved, _, _)| saved)
    }

    fn fail(&self, id: i64, step: Step, error: String) -> Result<ProcessingOutcome, PipelineError> {
        let message = error.clone();
        self.finish(id, Transition::Fail, Some(&message), ProcessingOutcome::Failed { step, error })
    }

    /// Applies the final transition. `outcome` only stands when this run
    /// still held the claim.
    fn finish(
        &self,
        id: i64,
        transition: Transition,
        error: Option<&str>,
        outcome: ProcessingOutcome,
    ) -> Result<ProcessingOutcome, PipelineError> {
        match index_repo::transition(&self.db, id, transition, error, self.clock.now())? {
            TransitionOutcome::Applied { .. } => Ok(outcome),
            TransitionOutcome::Rejected(_) => Ok(ProcessingOutcome::ClaimLost {
                status: index_repo::status_of(&self.db, id)?,
            }),
            TransitionOutcome::Missing => Err(PipelineError::CertificateNotFound(id)),
        }
    }

    /// Attempt log writes never fail the step itself.
    fn log_attempt<E: std::fmt::Display>(
        &self,
        certificate_id: i64,
        step: Step,
        attempt: u32,
        duration_ms: i64,
        result: Result<(), &E>,
        metadata: serde_json::Value,
    ) {
        let (status, error_message) = match result {
            Ok(()) => (AttemptStatus::Completed, None),
            Err(e) => (AttemptStatus::Failed, Some(e.to_string())),
        };
        let entry = LogEntry {
            certificate_id,
            operation: step.operation(),
            attempt,
            status,
            duration_ms,
            error_message,
            metadata,
            created_at: self.clock.now(),
        };
        if let Err(e) = processing_log_repo::append(&self.db, &entry) {
            warn!(certificate_id, error = %e, "could not append processing log");
        }
    }

    fn resolve_path(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.storage_directory.join(path)
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

fn timeout_to_extraction(e: TimeoutError) -> ExtractionError {
    match e {
        TimeoutError::Elapsed(after) => ExtractionError::Timeout(after),
        TimeoutError::Panicked => ExtractionError::Backend {
            backend: "worker".to_string(),
            message: "extraction panicked".to_string(),
        },
    }
}

fn timeout_to_preview(e: TimeoutError) -> PreviewError {
    match e {
        TimeoutError::Elapsed(after) => PreviewError::Timeout(after),
        TimeoutError::Panicked => PreviewError::Render("preview rendering panicked".to_string()),
    }
}

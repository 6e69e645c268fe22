//! Isolated environment for pipeline and notification tests.
//!
//! Every harness owns a temporary storage root, an in-memory database and a
//! manual clock set to 2024-05-10 09:00 UTC (12:00 in the default UTC+3
//! offset). Sleeps are recorded rather than performed.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use metalqms::db::notification_repo;
use metalqms::extractor::TextBackend;
use metalqms::notify::{NotificationPreferences, RateLimiter, RecordingTransport};
use metalqms::preview::PageRenderer;
use metalqms::{
    CertificateStore, Config, Database, Dispatcher, Extractor, ManualClock, Orchestrator,
    PipelineConfig, PreviewGenerator, RecordingSleeper, SearchService,
};

/// Material every harness upload is attached to.
pub const MATERIAL_ID: i64 = 4;
/// Uploader of every harness certificate.
pub const UPLOADER_ID: i64 = 7;

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub db: Database,
    pub clock: Arc<ManualClock>,
    pub sleeper: Arc<RecordingSleeper>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config::with_storage(temp_dir.path().to_string_lossy().into_owned());
        Self {
            config,
            db: Database::open_in_memory().expect("Failed to open database"),
            clock: Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap())),
            sleeper: Arc::new(RecordingSleeper::new()),
            temp_dir,
        }
    }

    pub fn storage_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn store(&self) -> CertificateStore {
        CertificateStore::new(
            self.db.clone(),
            self.storage_path(),
            self.config.max_upload_bytes,
            self.clock.clone(),
        )
    }

    /// Stores `pdf` as an upload by [`UPLOADER_ID`] and returns the new id.
    pub fn upload(&self, filename: &str, pdf: &[u8]) -> i64 {
        self.store()
            .register(MATERIAL_ID, filename, pdf, Some(UPLOADER_ID))
            .expect("Failed to register certificate")
            .certificate_id
    }

    pub fn pipeline_config(&self, preview_required: bool) -> PipelineConfig {
        let mut config = PipelineConfig::from_config(&self.config);
        config.preview_required = preview_required;
        config
    }

    pub fn orchestrator(
        &self,
        backend: Box<dyn TextBackend>,
        renderer: Box<dyn PageRenderer>,
        preview_required: bool,
    ) -> Orchestrator {
        Orchestrator::new(
            self.db.clone(),
            Arc::new(self.pipeline_config(preview_required)),
            Arc::new(Extractor::new(vec![backend], 1)),
            Arc::new(PreviewGenerator::new(
                renderer,
                self.config.preview.max_width,
                self.config.preview.max_height,
            )),
            self.clock.clone(),
            self.sleeper.clone(),
        )
    }

    pub fn search(&self) -> SearchService {
        SearchService::new(
            self.db.clone(),
            self.config.search.clone(),
            self.config.media_url.clone(),
        )
    }

    /// Dispatcher over `transport` with a 30 msg/s limiter on the harness
    /// clock.
    pub fn dispatcher(&self, transport: Arc<RecordingTransport>) -> Dispatcher {
        Dispatcher::new(
            self.db.clone(),
            transport,
            Arc::new(RateLimiter::new(30, self.clock.clone())),
            self.clock.clone(),
            self.sleeper.clone(),
        )
    }

    pub fn subscribe(&self, prefs: &NotificationPreferences) {
        notification_repo::upsert_preferences(&self.db, prefs).expect("Failed to store preferences");
    }
}

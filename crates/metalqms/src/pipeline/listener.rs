use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tracing::warn;

use crate::clock::Clock;
use crate::db::certificate_repo::CertificateRow;
use crate::notify::messages::{certificate_processed, CertificateSummary};
use crate::notify::preferences::DEFAULT_UTC_OFFSET_MINUTES;
use crate::notify::{Dispatcher, NotificationCategory, NotificationRequest};

use super::runner::{ProcessingOutcome, ProcessingReport};

/// Observes certificates that reached a terminal status.
pub trait ProcessingListener: Send + Sync {
    fn on_finished(&self, certificate: &CertificateRow, report: &ProcessingReport);
}

pub struct NoopListener;

impl ProcessingListener for NoopListener {
    fn on_finished(&self, _certificate: &CertificateRow, _report: &ProcessingReport) {}
}

/// Tells the uploader how processing went; failures are sent as urgent
/// alerts and also go to the configured admins.
pub struct NotifyingListener {
    dispatcher: Arc<Dispatcher>,
    admin_user_ids: Vec<i64>,
    clock: Arc<dyn Clock>,
}

impl NotifyingListener {
    pub fn new(dispatcher: Arc<Dispatcher>, admin_user_ids: Vec<i64>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dispatcher,
            admin_user_ids,
            clock,
        }
    }

    fn recipients(&self, certificate: &CertificateRow, failed: bool) -> Vec<i64> {
        let mut users: Vec<i64> = certificate.uploaded_by.into_iter().collect();
        if failed {
            users.extend(&self.admin_user_ids);
        }
        users.sort_unstable();
        users.dedup();
        users
    }
}

impl ProcessingListener for NotifyingListener {
    fn on_finished(&self, certificate: &CertificateRow, report: &ProcessingReport) {
        let (error, preview_error) = match &report.outcome {
            ProcessingOutcome::Completed => (None, None),
            ProcessingOutcome::CompletedWithoutPreview { preview_error } => (None, Some(preview_error.as_str())),
            ProcessingOutcome::Failed { error, .. } => (Some(error.as_str()), None),
            ProcessingOutcome::Skipped | ProcessingOutcome::Busy | ProcessingOutcome::ClaimLost { .. } => {
                return
            }
        };
        let failed = error.is_some();
        let fields = report.fields.as_ref();

        let summary = CertificateSummary {
            certificate_id: certificate.id,
            original_filename: &certificate.original_filename,
            grade: fields.and_then(|f| f.grade.as_deref()),
            heat_number: fields.and_then(|f| f.heat_number.as_deref()),
            error,
            preview_error,
        };
        let local = self.clock.now().naive_utc()
            + ChronoDuration::minutes(i64::from(DEFAULT_UTC_OFFSET_MINUTES));
        let message = certificate_processed(&summary, local);

        for user_id in self.recipients(certificate, failed) {
            let request = if failed {
                NotificationRequest::new(user_id, NotificationCategory::UrgentAlert, message.clone()).urgent()
            } else {
                NotificationRequest::new(user_id, NotificationCategory::CertificateProcessed, message.clone())
            }
            .about("certificate", certificate.id);

            if let Err(e) = self.dispatcher.send(&request) {
                warn!(user_id, certificate_id = certificate.id, error = %e, "processing notification not sent");
            }
        }
    }
}

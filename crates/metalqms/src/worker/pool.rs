use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};
use serde::Serialize;
use thiserror::Error;

use crate::pipeline::{Orchestrator, ProcessingOutcome, ProcessingReport};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Worker pool is shut down")]
    ChannelClosed,
}

/// One certificate to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateJob {
    pub certificate_id: i64,
    pub force: bool,
}

#[derive(Debug)]
pub struct JobResult {
    pub certificate_id: i64,
    pub result: Result<ProcessingReport, String>,
}

/// Fixed number of threads sharing one orchestrator. The job queue is
/// bounded, so `submit` blocks once every worker is busy and the queue is
/// full. Workers exit once the queue is closed and drained.
pub struct WorkerPool {
    job_sender: Sender<CertificateJob>,
    result_receiver: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `worker_count` workers (at least one).
    pub fn new(orchestrator: Arc<Orchestrator>, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (job_sender, job_receiver) = bounded::<CertificateJob>(worker_count * 2);
        let (result_sender, result_receiver) = unbounded::<JobResult>();

        let workers = (0..worker_count)
            .map(|worker_id| {
                let job_rx = job_receiver.clone();
                let result_tx = result_sender.clone();
                let orchestrator = Arc::clone(&orchestrator);
                thread::spawn(move || run_worker(worker_id, job_rx, result_tx, orchestrator))
            })
            .collect();

        info!("Started {} workers", worker_count);

        Self {
            job_sender,
            result_receiver,
            workers,
        }
    }

    pub fn submit(&self, job: CertificateJob) -> Result<(), WorkerError> {
        self.job_sender.send(job).map_err(|_| WorkerError::ChannelClosed)
    }

    pub fn try_recv_result(&self) -> Option<JobResult> {
        self.result_receiver.try_recv().ok()
    }

    /// Closes the queue, waits for the workers and returns the results
    /// not yet received.
    pub fn wait(self) -> Vec<JobResult> {
        drop(self.job_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
        self.result_receiver.try_iter().collect()
    }
}

fn run_worker(
    worker_id: usize,
    job_receiver: Receiver<CertificateJob>,
    result_sender: Sender<JobResult>,
    orchestrator: Arc<Orchestrator>,
) {
    debug!("Worker {} started", worker_id);

    for job in job_receiver.iter() {
        debug!("Worker {} processing certificate {}", worker_id, job.certificate_id);
        let result = orchestrator
            .process(job.certificate_id, job.force)
            .map_err(|e| e.to_string());

        let result = JobResult {
            certificate_id: job.certificate_id,
            result,
        };
        if let Err(e) = result_sender.send(result) {
            error!("Worker {} failed to send result: {}", worker_id, e);
            break;
        }
    }

    debug!("Worker {} stopped", worker_id);
}

/// Per-certificate outcomes of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub completed: usize,
    pub completed_without_preview: usize,
    pub failed: usize,
    pub skipped: usize,
    pub busy: usize,
    pub claim_lost: usize,
    /// Certificates the orchestrator could not handle at all (unknown id,
    /// database failure), one entry per submitted job.
    pub errors: Vec<(i64, String)>,
    pub reports: Vec<ProcessingReport>,
}

impl BatchReport {
    fn record(&mut self, result: JobResult) {
        self.total += 1;
        match result.result {
            Ok(report) => {
                match report.outcome {
                    ProcessingOutcome::Completed => self.completed += 1,
                    ProcessingOutcome::CompletedWithoutPreview { .. } => self.completed_without_preview += 1,
                    ProcessingOutcome::Failed { .. } => self.failed += 1,
                    ProcessingOutcome::Skipped => self.skipped += 1,
                    ProcessingOutcome::Busy => self.busy += 1,
                    ProcessingOutcome::ClaimLost { .. } => self.claim_lost += 1,
                }
                self.reports.push(report);
            }
            Err(e) => {
                self.errors.push((result.certificate_id, e));
            }
        }
    }
}

/// Processes `ids` on at most `worker_count` threads and collects a report
/// ordered by certificate id.
pub fn run_batch(
    orchestrator: Arc<Orchestrator>,
    ids: &[i64],
    force: bool,
    worker_count: usize,
) -> BatchReport {
    let pool = WorkerPool::new(orchestrator, worker_count.min(ids.len()).max(1));
    let mut report = BatchReport::default();

    for &certificate_id in ids {
        if let Err(e) = pool.submit(CertificateJob { certificate_id, force }) {
            report.total += 1;
            report.errors.push((certificate_id, e.to_string()));
            continue;
        }
        while let Some(result) = pool.try_recv_result() {
            report.record(result);
        }
    }

    for result in pool.wait() {
        report.record(result);
    }
    report.reports.sort_by_key(|r| r.certificate_id);
    report.errors.sort_by_key(|(id, _)| *id);
    info!(
        "Batch finished: {} total, {} completed, {} failed, {} skipped, {} busy",
        report.total, report.completed, report.failed, report.skipped, report.busy
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, RecordingSleeper};
    use crate::db::certificate_repo::{self, NewCertificate};
    use crate::db::{index_repo, Database};
    use crate::error::PreviewError;
    use crate::extractor::pdf::pdf_with_text;
    use crate::extractor::{Extractor, LopdfBackend};
    use crate::pipeline::{PipelineConfig, ProcessingStatus, RetryPolicy, Transition};
    use crate::preview::{PageRenderer, PreviewGenerator};
    use chrono::Utc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct NoRenderer;

    impl PageRenderer for NoRenderer {
        fn render_first_page(&self, _pdf: &[u8]) -> Result<Vec<u8>, PreviewError> {
            Err(PreviewError::Render("renderer disabled".into()))
        }
    }

    fn setup(files: &[(&str, Vec<u8>)]) -> (TempDir, Database, Arc<Orchestrator>, Vec<i64>) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().unwrap();
        let ids = files
            .iter()
            .map(|(name, bytes)| {
                std::fs::write(dir.path().join(name), bytes).unwrap();
                certificate_repo::insert(
                    &db,
                    &NewCertificate {
                        material_id: 1,
                        file_path: name.to_string(),
                        original_filename: name.to_string(),
                        file_size: bytes.len() as i64,
                        content_hash: name.to_string(),
                        uploaded_by: None,
                        uploaded_at: Utc::now(),
                    },
                )
                .unwrap()
            })
            .collect();

        let once = RetryPolicy::once();
        let config = PipelineConfig {
            storage_directory: dir.path().to_path_buf(),
            preview_directory: dir.path().join("previews"),
            extraction_timeout: Duration::from_secs(30),
            preview_timeout: Duration::from_secs(30),
            preview_required: false,
            extraction_retry: once,
            indexing_retry: once,
            preview_retry: once,
            stale_after: Duration::from_secs(1800),
        };
        let orchestrator = Orchestrator::new(
            db.clone(),
            Arc::new(config),
            Arc::new(Extractor::new(vec![Box::new(LopdfBackend)], 1)),
            Arc::new(PreviewGenerator::new(Box::new(NoRenderer), 300, 400)),
            Arc::new(ManualClock::new(Utc::now())),
            Arc::new(RecordingSleeper::new()),
        );
        (dir, db, Arc::new(orchestrator), ids)
    }

    #[test]
    fn test_batch_counts_outcomes() {
        let (_dir, db, orchestrator, ids) = setup(&[
            ("a.pdf", pdf_with_text("Marka 40X")),
            ("b.pdf", pdf_with_text("Marka 09G2S")),
            ("c.pdf", pdf_with_text("")),
            ("d.pdf", pdf_with_text("Marka St3")),
        ]);
        index_repo::ensure_entry(&db, ids[3], Utc::now()).unwrap();
        index_repo::transition(&db, ids[3], Transition::Start, None, Utc::now()).unwrap();

        let mut all = ids.clone();
        all.push(999);
        let report = run_batch(orchestrator, &all, false, 3);

        assert_eq!(report.total, 5);
        assert_eq!(report.completed_without_preview, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.busy, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, 999);
        assert!(report.errors[0].1.contains("not found"));
        let reported: Vec<i64> = report.reports.iter().map(|r| r.certificate_id).collect();
        assert_eq!(reported, ids);
    }

    #[test]
    fn test_second_batch_skips_completed() {
        let (_dir, db, orchestrator, ids) = setup(&[
            ("a.pdf", pdf_with_text("Marka 40X")),
            ("b.pdf", pdf_with_text("Marka 09G2S")),
        ]);
        run_batch(Arc::clone(&orchestrator), &ids, false, 2);
        let again = run_batch(Arc::clone(&orchestrator), &ids, false, 2);
        assert_eq!(again.skipped, 2);

        let forced = run_batch(orchestrator, &ids, true, 2);
        assert_eq!(forced.completed_without_preview, 2);
        for id in ids {
            assert_eq!(index_repo::status_of(&db, id).unwrap(), Some(ProcessingStatus::Completed));
        }
    }

    #[test]
    fn test_same_certificate_claimed_once() {
        let (_dir, db, orchestrator, ids) = setup(&[("a.pdf", pdf_with_text("Marka 40X"))]);
        let repeated = vec![ids[0]; 8];

        let report = run_batch(orchestrator, &repeated, false, 4);

        assert_eq!(report.total, 8);
        assert_eq!(report.completed_without_preview, 1);
        assert_eq!(report.busy + report.skipped, 7);
        let extraction_attempts = crate::db::processing_log_repo::for_certificate(&db, ids[0])
            .unwrap()
            .into_iter()
            .filter(|e| e.operation == crate::db::processing_log_repo::Operation::TextExtraction)
            .count();
        assert_eq!(extraction_attempts, 1);
    }

    #[test]
    fn test_repeated_unknown_ids_keep_every_error() {
        let (_dir, _db, orchestrator, _ids) = setup(&[]);

        let report = run_batch(orchestrator, &[404, 404, 404], false, 2);

        assert_eq!(report.total, 3);
        assert_eq!(report.errors.len(), report.total);
        assert!(report.errors.iter().all(|(id, e)| *id == 404 && e.contains("not found")));
    }

    #[test]
    fn test_wait_drains_submitted_jobs() {
        let (_dir, _db, orchestrator, ids) = setup(&[("a.pdf", pdf_with_text("Marka 40X"))]);
        let pool = WorkerPool::new(orchestrator, 2);
        pool.submit(CertificateJob {
            certificate_id: ids[0],
            force: false,
        })
        .unwrap();

        let results = pool.wait();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].certificate_id, ids[0]);
        assert!(results[0].result.is_ok());
    }
}

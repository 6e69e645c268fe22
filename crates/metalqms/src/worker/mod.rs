pub mod pool;

pub use pool::{run_batch, BatchReport, CertificateJob, JobResult, WorkerError, WorkerPool};

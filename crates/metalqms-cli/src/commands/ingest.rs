use std::sync::Arc;

use anyhow::{bail, Result};
use metalqms::{run_batch, CertificateStore, SystemClock};
use serde_json::json;
use tracing::{error, info};

use super::{print_json, Context};
use crate::cli::IngestArgs;

pub fn run(ctx: &Context, args: IngestArgs) -> Result<()> {
    let store = CertificateStore::new(
        ctx.db.clone(),
        ctx.config.storage_directory(),
        ctx.config.max_upload_bytes,
        Arc::new(SystemClock),
    );

    let mut stored = Vec::new();
    let mut rejected = Vec::new();
    for path in &args.files {
        match store.ingest_file(path, args.material_id, args.uploaded_by) {
            Ok(certificate) => {
                info!(
                    certificate_id = certificate.certificate_id,
                    file_size = certificate.file_size,
                    duplicate_of = ?certificate.duplicate_of,
                    "certificate stored"
                );
                stored.push(certificate);
            }
            Err(e) => {
                error!(file = %path.display(), error = %e, "certificate rejected");
                rejected.push(json!({ "file": path.display().to_string(), "error": e.to_string() }));
            }
        }
    }

    let batch = if args.process && !stored.is_empty() {
        let ids: Vec<i64> = stored.iter().map(|c| c.certificate_id).collect();
        Some(run_batch(ctx.orchestrator()?, &ids, false, ctx.config.worker_count))
    } else {
        None
    };

    let stored_json: Vec<_> = stored
        .iter()
        .map(|c| {
            json!({
                "certificate_id": c.certificate_id,
                "path": c.relative_path.display().to_string(),
                "content_hash": c.content_hash,
                "file_size": c.file_size,
                "duplicate_of": c.duplicate_of,
            })
        })
        .collect();
    print_json(&json!({ "stored": stored_json, "rejected": rejected, "processing": batch }))?;

    if !rejected.is_empty() {
        bail!("{} of {} files were not ingested", rejected.len(), args.files.len());
    }
    Ok(())
}

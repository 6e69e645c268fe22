use anyhow::Result;
use metalqms::db::certificate_repo::{self, CertificateFilter};
use metalqms::db::{index_repo, preview_repo};
use metalqms::{run_batch, BatchReport};
use serde_json::json;
use tracing::{info, warn};

use super::{print_json, Context};
use crate::cli::ReprocessArgs;

pub fn run(ctx: &Context, args: ReprocessArgs) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;

    if !args.dry_run {
        let released = orchestrator.recover_stale()?;
        if !released.is_empty() {
            warn!(count = released.len(), "released stale processing claims");
        }
    }

    let filter = CertificateFilter {
        ids: (!args.ids.is_empty()).then(|| args.ids.clone()),
        failed_only: args.failed_only,
        missing_preview: args.missing_preview,
        limit: args.limit,
    };
    let ids = certificate_repo::select_ids(&ctx.db, &filter)?;
    info!(selected = ids.len(), force = args.force, "certificates selected");

    if args.dry_run {
        let mut rows = Vec::with_capacity(ids.len());
        for &id in &ids {
            let index_status = index_repo::status_of(&ctx.db, id)?;
            let preview_status = preview_repo::find(&ctx.db, id)?.map(|p| p.status);
            rows.push(json!({
                "certificate_id": id,
                "index_status": index_status.map(|s| s.as_str()),
                "preview_status": preview_status.map(|s| s.as_str()),
            }));
        }
        return print_json(&json!({ "dry_run": true, "certificates": rows }));
    }

    // A completed certificate with a missing preview is only rerun when forced.
    let force = args.force || args.missing_preview;
    let workers = args.workers.unwrap_or(ctx.config.worker_count).max(1);
    let batch_size = args.batch_size.max(1);

    let mut total = BatchReport::default();
    for (number, chunk) in ids.chunks(batch_size).enumerate() {
        info!(batch = number + 1, size = chunk.len(), "processing batch");
        let report = run_batch(orchestrator.clone(), chunk, force, workers);
        merge(&mut total, report);
    }

    print_json(&total)
}

fn merge(total: &mut BatchReport, batch: BatchReport) {
    total.total += batch.total;
    total.completed += batch.completed;
    total.completed_without_preview += batch.completed_without_preview;
    total.failed += batch.failed;
    total.skipped += batch.skipped;
    total.busy += batch.busy;
    total.claim_lost += batch.claim_lost;
    total.errors.extend(batch.errors);
    total.reports.extend(batch.reports);
}

use anyhow::Result;
use serde_json::json;
use tracing::info;

use super::{print_json, Context};
use crate::cli::CleanupArgs;

pub fn run(ctx: &Context, args: CleanupArgs) -> Result<()> {
    let released = ctx.orchestrator()?.recover_stale()?;
    info!(count = released.len(), "stale processing claims released");

    let deleted = if args.processing_only {
        None
    } else {
        Some(ctx.dispatcher()?.cleanup(args.days)?)
    };

    print_json(&json!({ "released": released, "notifications_deleted": deleted }))
}

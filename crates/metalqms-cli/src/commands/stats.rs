use anyhow::Result;
use metalqms::db::{notification_repo, stats_repo};
use serde_json::json;

use super::{print_json, Context};

pub fn run(ctx: &Context) -> Result<()> {
    let processing = stats_repo::processing_stats(&ctx.db)?;
    let notifications = notification_repo::count_by_status(&ctx.db)?;
    print_json(&json!({ "processing": processing, "notifications": notifications }))
}

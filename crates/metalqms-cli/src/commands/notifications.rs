use anyhow::Result;
use metalqms::notify::{DispatchOutcome, TelegramTransport};
use serde_json::{json, Value};

use super::{print_json, Context};
use crate::cli::{BroadcastArgs, NotificationCleanupArgs, ResendArgs, RunDueArgs};

pub fn run_due(ctx: &Context, args: RunDueArgs) -> Result<()> {
    let report = ctx.dispatcher()?.run_due(args.limit)?;
    print_json(&report)
}

pub fn resend(ctx: &Context, args: ResendArgs) -> Result<()> {
    let outcome = ctx.dispatcher()?.resend(args.log_id)?;
    print_json(&outcome_json(&outcome))
}

pub fn cleanup(ctx: &Context, args: NotificationCleanupArgs) -> Result<()> {
    let deleted = ctx.dispatcher()?.cleanup(args.days)?;
    print_json(&json!({ "deleted": deleted }))
}

pub fn broadcast(ctx: &Context, args: BroadcastArgs) -> Result<()> {
    let dispatcher = ctx.dispatcher()?;
    let outcomes = dispatcher.send_many(&args.users, args.category, &args.message, args.urgent)?;
    let summary: Vec<Value> = outcomes
        .iter()
        .map(|(user_id, outcome)| {
            let mut entry = outcome_json(outcome);
            entry["user_id"] = json!(user_id);
            entry
        })
        .collect();
    print_json(&summary)
}

pub fn ping(ctx: &Context) -> Result<()> {
    let transport = TelegramTransport::from_config(&ctx.config.notifications)?;
    let identity = transport.get_me()?;
    print_json(&identity)
}

fn outcome_json(outcome: &DispatchOutcome) -> Value {
    match outcome {
        DispatchOutcome::Dropped(reason) => json!({ "outcome": "dropped", "reason": reason.as_str() }),
        DispatchOutcome::Suppressed { log_id, until } => {
            json!({ "outcome": "suppressed", "log_id": log_id, "until": until })
        }
        DispatchOutcome::Sent { log_id } => json!({ "outcome": "sent", "log_id": log_id }),
        DispatchOutcome::Retrying {
            log_id,
            retry_count,
            next_attempt_at,
        } => json!({
            "outcome": "retrying",
            "log_id": log_id,
            "retry_count": retry_count,
            "next_attempt_at": next_attempt_at,
        }),
        DispatchOutcome::Failed { log_id, error } => {
            json!({ "outcome": "failed", "log_id": log_id, "error": error.to_string() })
        }
    }
}

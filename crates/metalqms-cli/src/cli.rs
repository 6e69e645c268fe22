use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use metalqms::NotificationCategory;

#[derive(Parser, Debug)]
#[command(
    name = "metalqms",
    version,
    about = "Certificate ingestion, processing and notification tooling"
)]
pub struct Cli {
    /// Configuration file (JSON).
    #[arg(long, global = true, default_value = "metalqms.json")]
    pub config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store PDF certificates and register them for processing.
    Ingest(IngestArgs),
    /// Run the processing pipeline over stored certificates.
    Reprocess(ReprocessArgs),
    /// Print processing and notification statistics.
    Stats,
    /// Search processed certificates.
    Search(SearchArgs),
    /// Autocomplete identification values.
    Suggest(SuggestArgs),
    /// Release stale processing claims and prune old notification logs.
    Cleanup(CleanupArgs),
    #[command(subcommand)]
    Notifications(NotificationCommands),
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[arg(long)]
    pub material_id: i64,

    #[arg(long)]
    pub uploaded_by: Option<i64>,

    /// Process the new certificates right away.
    #[arg(long, default_value_t = false)]
    pub process: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReprocessArgs {
    /// Comma-separated certificate ids.
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<i64>,

    #[arg(long, default_value_t = false, conflicts_with = "missing_preview")]
    pub failed_only: bool,

    #[arg(long, default_value_t = false)]
    pub missing_preview: bool,

    /// Reprocess certificates that already completed.
    #[arg(long, default_value_t = false)]
    pub force: bool,

    /// List the selected certificates without processing them.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    #[arg(long, default_value_t = 10)]
    pub batch_size: usize,

    /// Defaults to the configured worker count.
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub limit: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    #[arg(default_value = "")]
    pub text: String,

    #[arg(long)]
    pub grade: Option<String>,

    #[arg(long)]
    pub heat_number: Option<String>,

    #[arg(long)]
    pub certificate_number: Option<String>,

    #[arg(long)]
    pub supplier: Option<String>,

    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct SuggestArgs {
    pub partial: String,

    #[arg(long, value_enum, default_value_t = SuggestField::All)]
    pub field: SuggestField,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SuggestField {
    Grade,
    HeatNumber,
    Supplier,
    Certificate,
    All,
}

#[derive(Args, Debug, Clone)]
pub struct CleanupArgs {
    /// Notification log entries older than this many days are deleted.
    #[arg(long, default_value_t = 30)]
    pub days: u32,

    /// Only release stale processing claims.
    #[arg(long, default_value_t = false)]
    pub processing_only: bool,
}

#[derive(Subcommand, Debug)]
pub enum NotificationCommands {
    /// Deliver scheduled retries and notifications held by quiet hours.
    RunDue(RunDueArgs),
    /// Send a failed notification again.
    Resend(ResendArgs),
    /// Delete old notification log entries.
    Cleanup(NotificationCleanupArgs),
    /// Send one message to several users.
    Broadcast(BroadcastArgs),
    /// Check the bot token and API connectivity.
    Ping,
}

#[derive(Args, Debug, Clone)]
pub struct RunDueArgs {
    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ResendArgs {
    pub log_id: i64,
}

#[derive(Args, Debug, Clone)]
pub struct BroadcastArgs {
    #[arg(long, value_delimiter = ',', required = true)]
    pub users: Vec<i64>,

    #[arg(long, default_value = "status_update")]
    pub category: NotificationCategory,

    /// Bypass quiet hours and disabled categories.
    #[arg(long, default_value_t = false)]
    pub urgent: bool,

    pub message: String,
}

#[derive(Args, Debug, Clone)]
pub struct NotificationCleanupArgs {
    #[arg(long, default_value_t = 30)]
    pub days: u32,
}

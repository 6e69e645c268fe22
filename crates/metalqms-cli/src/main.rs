mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::{Cli, Commands, NotificationCommands};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    if let Err(err) = run(cli) {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = metalqms::load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let ctx = commands::Context::open(config)?;

    match cli.command {
        Commands::Ingest(args) => commands::ingest::run(&ctx, args),
        Commands::Reprocess(args) => commands::reprocess::run(&ctx, args),
        Commands::Stats => commands::stats::run(&ctx),
        Commands::Search(args) => commands::search::run(&ctx, args),
        Commands::Suggest(args) => commands::search::suggest(&ctx, args),
        Commands::Cleanup(args) => commands::cleanup::run(&ctx, args),
        Commands::Notifications(command) => match command {
            NotificationCommands::RunDue(args) => commands::notifications::run_due(&ctx, args),
            NotificationCommands::Resend(args) => commands::notifications::resend(&ctx, args),
            NotificationCommands::Cleanup(args) => commands::notifications::cleanup(&ctx, args),
            NotificationCommands::Broadcast(args) => commands::notifications::broadcast(&ctx, args),
            NotificationCommands::Ping => commands::notifications::ping(&ctx),
        },
    }
}

/// Installs the fmt subscriber and routes `log` records from the library
/// into it.
fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer);

    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("log bridge not installed: {}", e);
    }
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("tracing subscriber not installed: {}", e);
    }
}

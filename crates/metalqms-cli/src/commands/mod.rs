pub mod cleanup;
pub mod ingest;
pub mod notifications;
pub mod reprocess;
pub mod search;
pub mod stats;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use metalqms::pipeline::NotifyingListener;
use metalqms::{Config, Database, Dispatcher, Orchestrator, SystemClock};
use serde::Serialize;
use tracing::info;

/// Loaded configuration plus the open database shared by all commands.
pub struct Context {
    pub config: Config,
    pub db: Database,
}

impl Context {
    pub fn open(config: Config) -> Result<Self> {
        let path = config
            .database_path()
            .ok_or_else(|| anyhow!("no database path configured and no home directory found"))?;
        let db = Database::open(&path)?;
        Ok(Self { config, db })
    }

    pub fn dispatcher(&self) -> Result<Dispatcher> {
        Ok(Dispatcher::from_config(self.db.clone(), &self.config.notifications)?)
    }

    /// The processing orchestrator; reports outcomes over Telegram when
    /// notifications are enabled.
    pub fn orchestrator(&self) -> Result<Arc<Orchestrator>> {
        let orchestrator = Orchestrator::from_config(self.db.clone(), &self.config);
        if !self.config.notifications.enabled {
            return Ok(Arc::new(orchestrator));
        }

        info!("processing notifications enabled");
        let listener = NotifyingListener::new(
            Arc::new(self.dispatcher()?),
            self.config.notifications.admin_user_ids.clone(),
            Arc::new(SystemClock),
        );
        Ok(Arc::new(orchestrator.with_listener(Arc::new(listener))))
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

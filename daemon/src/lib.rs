pub mod handlers;

use anyhow::{Context as _, Result};
use common::PalisadeConfig;
use engine::manager::BackupManager;
use engine::scheduler::{self, SchedulerHandle};
use engine::{BackupFormat, ConnectionProfile, Engine, ScheduleConfig, SchedulePeriod};
use handlers::command::{self, Context};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Long-running daemon serving the line-delimited JSON command interface.
pub struct Daemon {
    ctx: Arc<Context>,
    scheduler_task: JoinHandle<()>,
}

impl Daemon {
    pub fn new(manager: Arc<BackupManager>, config: PalisadeConfig) -> Self {
        let (scheduler, scheduler_task) = scheduler::spawn(Arc::clone(&manager));
        Daemon {
            ctx: Arc::new(Context {
                manager,
                scheduler,
                config: Arc::new(Mutex::new(config)),
                persist_config: true,
            }),
            scheduler_task,
        }
    }

    pub fn scheduler(&self) -> SchedulerHandle {
        self.ctx.scheduler.clone()
    }

    /// Applies the startup configuration: connects to the configured
    /// database and arms the schedule. Both are best-effort; a bad config
    /// leaves the daemon up and waiting for commands.
    pub async fn apply_config(&self) {
        let config = self.ctx.config.lock().unwrap().clone();

        if !config.database.name.is_empty() && !config.database.user.is_empty() {
            match parse_engine(&config.database.engine) {
                Some(engine) => {
                    let profile = ConnectionProfile {
                        engine,
                        host: config.database.host.clone(),
                        port: config.database.port.unwrap_or_else(|| engine.default_port()),
                        database: config.database.name.clone(),
                        user: config.database.user.clone(),
                        password: config.database.password.clone(),
                    };
                    if let Err(e) = self.ctx.manager.connect(profile).await {
                        warn!("Startup connection to {} failed: {e}", config.database.name);
                    }
                }
                None => warn!("Unknown engine in config: {}", config.database.engine),
            }
        }

        let period = match parse_period(&config.backup.schedule) {
            Some(period) => period,
            None => {
                warn!("Unknown schedule in config: {}", config.backup.schedule);
                return;
            }
        };
        if period == SchedulePeriod::Disabled {
            return;
        }
        let schedule = ScheduleConfig {
            period,
            directory: PathBuf::from(&config.backup.location),
            format: parse_format(&config.backup.format).unwrap_or_default(),
        };
        if let Err(e) = self.ctx.scheduler.set_schedule(schedule).await {
            warn!("Failed to arm configured schedule: {e}");
        }
    }

    /// Accept loop. Runs until the listener errors or the task is dropped.
    pub async fn serve(&self, bind: &str) -> Result<()> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        info!("Listening on {bind}");

        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .context("failed to accept connection")?;
            info!("Client connected: {peer}");
            let ctx = Arc::clone(&self.ctx);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(ctx, stream).await {
                    error!("Client {peer} error: {e}");
                }
                info!("Client disconnected: {peer}");
            });
        }
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.ctx.scheduler.shutdown().await {
            warn!("Scheduler already stopped: {e}");
        }
        self.scheduler_task.abort();
        info!("Daemon stopped");
    }
}

async fn handle_connection(ctx: Arc<Context>, stream: TcpStream) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = command::dispatch_line(&ctx, &line).await;
        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        writer.write_all(payload.as_bytes()).await?;
    }
    Ok(())
}

fn parse_engine(value: &str) -> Option<Engine> {
    match value {
        "postgresql" | "postgres" => Some(Engine::Postgresql),
        "mysql" => Some(Engine::Mysql),
        _ => None,
    }
}

fn parse_period(value: &str) -> Option<SchedulePeriod> {
    match value {
        "disabled" => Some(SchedulePeriod::Disabled),
        "hourly" => Some(SchedulePeriod::Hourly),
        "daily" => Some(SchedulePeriod::Daily),
        "weekly" => Some(SchedulePeriod::Weekly),
        _ => None,
    }
}

fn parse_format(value: &str) -> Option<BackupFormat> {
    match value {
        "sql" => Some(BackupFormat::Sql),
        "csv" => Some(BackupFormat::Csv),
        _ => None,
    }
}

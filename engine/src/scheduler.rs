use log::{error, info, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::common::ScheduleConfig;
use crate::manager::BackupManager;
use crate::{EngineError, Result};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SchedulerState {
    Disabled,
    Armed { seconds_until_fire: u64 },
    Running,
}

enum Command {
    SetSchedule(ScheduleConfig),
    Status(oneshot::Sender<SchedulerState>),
    Shutdown,
}

/// Handle to the scheduler task. Cloneable; all clones talk to the same
/// task, and dropping them all stops nothing, use `shutdown` for that.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
}

impl SchedulerHandle {
    /// Replaces the active schedule atomically. The previous deadline is
    /// discarded; a disabled period disarms the scheduler entirely.
    pub async fn set_schedule(&self, config: ScheduleConfig) -> Result<()> {
        self.tx
            .send(Command::SetSchedule(config))
            .await
            .map_err(|_| EngineError::Cancelled)
    }

    pub async fn status(&self) -> Result<SchedulerState> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Command::Status(tx))
            .await
            .map_err(|_| EngineError::Cancelled)?;
        rx.await.map_err(|_| EngineError::Cancelled)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| EngineError::Cancelled)
    }
}

/// Spawns the scheduler task. Backups fire on the configured period and run
/// through the manager; a tick that lands while the previous run is still in
/// flight is skipped, not queued.
pub fn spawn(manager: Arc<BackupManager>) -> (SchedulerHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(16);
    let task = tokio::spawn(run_loop(manager, rx));
    (SchedulerHandle { tx }, task)
}

async fn run_loop(manager: Arc<BackupManager>, mut rx: mpsc::Receiver<Command>) {
    let mut config: Option<ScheduleConfig> = None;
    let mut deadline: Option<Instant> = None;
    let mut in_flight: Option<JoinHandle<()>> = None;
    let (done_tx, mut done_rx) = mpsc::channel::<()>(4);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::SetSchedule(new)) => {
                    match new.period.duration() {
                        Some(period) => {
                            info!(
                                "Schedule set: {:?} backups into {}",
                                new.period,
                                new.directory.display()
                            );
                            deadline = Some(Instant::now() + period);
                            config = Some(new);
                        }
                        None => {
                            info!("Schedule disabled");
                            deadline = None;
                            config = None;
                        }
                    }
                }
                Some(Command::Status(reply)) => {
                    let state = if in_flight.is_some() {
                        SchedulerState::Running
                    } else if let Some(deadline) = deadline {
                        SchedulerState::Armed {
                            seconds_until_fire: deadline
                                .saturating_duration_since(Instant::now())
                                .as_secs(),
                        }
                    } else {
                        SchedulerState::Disabled
                    };
                    let _ = reply.send(state);
                }
                Some(Command::Shutdown) | None => {
                    if let Some(run) = in_flight.take() {
                        run.abort();
                    }
                    info!("Scheduler stopped");
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() =>
            {
                deadline = None;
                let Some(cfg) = config.clone() else { continue };

                if in_flight.is_some() {
                    warn!("Scheduled backup skipped: previous run still in flight");
                    if let Some(period) = cfg.period.duration() {
                        deadline = Some(Instant::now() + period);
                    }
                    continue;
                }

                let manager = Arc::clone(&manager);
                let done = done_tx.clone();
                in_flight = Some(tokio::spawn(async move {
                    match manager.create_backup(&cfg.directory, cfg.format).await {
                        Ok(artifact) => {
                            info!("Scheduled backup completed: {}", artifact.path.display())
                        }
                        Err(e) => error!("Scheduled backup failed: {e}"),
                    }
                    let _ = done.send(()).await;
                }));
            },
            Some(_) = done_rx.recv() => {
                in_flight = None;
                // Re-arm from completion time so slow runs do not pile up.
                if deadline.is_none() {
                    if let Some(period) = config.as_ref().and_then(|c| c.period.duration()) {
                        deadline = Some(Instant::now() + period);
                    }
                }
            },
        }
    }
}

use common::PalisadeConfig;
use engine::manager::BackupManager;
use engine::scheduler::SchedulerHandle;
use engine::{
    BackupFormat, ConnectionProfile, Engine, EngineError, ScheduleConfig, SchedulePeriod,
    ServiceAction,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// One request per line, tagged by the `op` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Connect {
        engine: Engine,
        host: Option<String>,
        port: Option<u16>,
        database: String,
        user: String,
        password: Option<String>,
    },
    Disconnect,
    CreateBackup {
        directory: Option<String>,
        format: Option<BackupFormat>,
    },
    RestoreBackup {
        path: String,
    },
    ListBackups {
        directory: Option<String>,
    },
    SetSchedule {
        period: SchedulePeriod,
        directory: Option<String>,
        format: Option<BackupFormat>,
    },
    ServiceControl {
        service_type: Engine,
        action: ServiceAction,
    },
    Status,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Response {
            status: "success",
            kind: None,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: serde_json::Value) -> Self {
        Response {
            status: "success",
            kind: None,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn error(err: &EngineError) -> Self {
        Response {
            status: "error",
            kind: Some(err.kind().to_string()),
            message: Some(err.to_string()),
            data: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Response {
            status: "error",
            kind: Some("invalid_request".to_string()),
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Shared state the command handlers operate on.
pub struct Context {
    pub manager: Arc<BackupManager>,
    pub scheduler: SchedulerHandle,
    pub config: Arc<Mutex<PalisadeConfig>>,
    /// Whether schedule changes are written back to the config file.
    pub persist_config: bool,
}

/// Parses one request line and executes it. Always produces a response;
/// malformed input is answered, not dropped.
pub async fn dispatch_line(ctx: &Context, line: &str) -> Response {
    let request = match serde_json::from_str::<Request>(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected malformed request: {e}");
            return Response::bad_request(format!("invalid request: {e}"));
        }
    };
    dispatch(ctx, request).await
}

pub async fn dispatch(ctx: &Context, request: Request) -> Response {
    match request {
        Request::Connect {
            engine,
            host,
            port,
            database,
            user,
            password,
        } => {
            let profile = ConnectionProfile {
                engine,
                host: host.unwrap_or_else(|| "localhost".to_string()),
                port: port.unwrap_or_else(|| engine.default_port()),
                database,
                user,
                password,
            };
            match ctx.manager.connect(profile).await {
                Ok(profile) => Response::with_data(
                    format!("connected to database {}", profile.database),
                    serde_json::json!({
                        "engine": profile.engine.as_str(),
                        "host": profile.host,
                        "port": profile.port,
                        "database": profile.database,
                    }),
                ),
                Err(e) => Response::error(&e),
            }
        }

        Request::Disconnect => {
            ctx.manager.disconnect();
            Response::success("disconnected")
        }

        Request::CreateBackup { directory, format } => {
            let directory = directory.unwrap_or_else(|| default_location(ctx));
            let format = format.unwrap_or_default();
            match ctx
                .manager
                .create_backup(&PathBuf::from(&directory), format)
                .await
            {
                Ok(artifact) => Response::with_data(
                    format!("backup created: {}", artifact.path.display()),
                    serde_json::json!(artifact),
                ),
                Err(e) => Response::error(&e),
            }
        }

        Request::RestoreBackup { path } => {
            match ctx.manager.restore_backup(&PathBuf::from(&path)).await {
                Ok(()) => Response::success(format!("restored from {path}")),
                Err(e) => Response::error(&e),
            }
        }

        Request::ListBackups { directory } => {
            let directory = directory.unwrap_or_else(|| default_location(ctx));
            match ctx.manager.list_backups(&PathBuf::from(&directory)) {
                Ok(artifacts) => Response::with_data(
                    format!("{} backups in {directory}", artifacts.len()),
                    serde_json::json!(artifacts),
                ),
                Err(e) => Response::error(&e),
            }
        }

        Request::SetSchedule {
            period,
            directory,
            format,
        } => {
            let directory = directory.unwrap_or_else(|| default_location(ctx));
            let format = format.unwrap_or_default();
            let schedule = ScheduleConfig {
                period,
                directory: PathBuf::from(&directory),
                format,
            };
            if let Err(e) = ctx.scheduler.set_schedule(schedule).await {
                return Response::error(&e);
            }

            persist_schedule(ctx, period, &directory, format);
            Response::success(format!("schedule set to {period}"))
        }

        Request::ServiceControl {
            service_type,
            action,
        } => match ctx.manager.service_control(service_type, action).await {
            Ok(state) => Response::with_data(
                format!("{service_type} service is {state}"),
                serde_json::json!({ "service_state": state }),
            ),
            Err(e) => Response::error(&e),
        },

        Request::Status => {
            let scheduler = match ctx.scheduler.status().await {
                Ok(state) => state,
                Err(e) => return Response::error(&e),
            };
            let connection = ctx.manager.current();
            Response::with_data(
                "daemon is running",
                serde_json::json!({
                    "connected": connection.is_some(),
                    "engine": connection.as_ref().map(|p| p.engine.as_str()),
                    "database": connection.as_ref().map(|p| p.database.clone()),
                    "scheduler": scheduler,
                }),
            )
        }
    }
}

fn default_location(ctx: &Context) -> String {
    ctx.config.lock().unwrap().backup.location.clone()
}

/// Writes the new schedule back to the config file so it survives restarts.
/// Persistence failures downgrade to warnings; the in-memory schedule is
/// already active.
fn persist_schedule(ctx: &Context, period: SchedulePeriod, directory: &str, format: BackupFormat) {
    let snapshot = {
        let mut config = ctx.config.lock().unwrap();
        config.backup.schedule = period.as_str().to_string();
        config.backup.location = directory.to_string();
        config.backup.format = format.as_str().to_string();
        config.clone()
    };

    if !ctx.persist_config {
        return;
    }
    match common::update_config(&snapshot) {
        Ok(()) => info!("Persisted schedule: {period} into {directory}"),
        Err(e) => warn!("Failed to persist schedule: {e}"),
    }
}

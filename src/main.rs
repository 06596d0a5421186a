use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use engine::manager::BackupManager;
use engine::{BackupFormat, ConnectionProfile, Engine, ServiceAction};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(
    name = "palisade",
    about = "Scheduled dump and restore daemon for PostgreSQL and MySQL",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Database engine
    #[clap(long, value_enum)]
    engine: Engine,

    #[clap(long, default_value = "localhost")]
    host: String,

    /// Server port; defaults to the engine's standard port
    #[clap(long)]
    port: Option<u16>,

    #[clap(long)]
    database: String,

    #[clap(long)]
    user: String,

    #[clap(long)]
    password: Option<String>,
}

impl ConnectionArgs {
    fn profile(&self) -> ConnectionProfile {
        ConnectionProfile {
            engine: self.engine,
            host: self.host.clone(),
            port: self.port.unwrap_or_else(|| self.engine.default_port()),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the palisade daemon in the foreground
    Run {
        /// Address for the command interface
        #[clap(long, default_value = "127.0.0.1:5002")]
        bind: String,
    },

    /// Create a one-off backup
    Backup {
        #[clap(flatten)]
        conn: ConnectionArgs,

        /// Directory to write the artifact into
        #[clap(long)]
        backup_dir: PathBuf,

        #[clap(long, value_enum, default_value = "sql")]
        format: BackupFormat,
    },

    /// Restore a SQL backup into a database
    Restore {
        #[clap(flatten)]
        conn: ConnectionArgs,

        /// Path to the .sql artifact
        #[clap(long)]
        file: PathBuf,
    },

    /// List backup artifacts in a directory
    ListBackups {
        #[clap(long)]
        backup_dir: PathBuf,
    },

    /// Start, stop, or restart a database server via systemd
    Service {
        #[clap(long, value_enum)]
        service_type: Engine,

        #[clap(long, value_enum)]
        action: ServiceAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .format_level(true)
        .format_module_path(false)
        .format_indent(Some(4))
        .filter_level(log::LevelFilter::Info)
        .try_init()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { bind } => run_daemon(&bind).await?,

        Commands::Backup {
            conn,
            backup_dir,
            format,
        } => {
            let manager = BackupManager::system();
            manager.connect(conn.profile()).await?;
            let artifact = manager.create_backup(&backup_dir, format).await?;
            println!(
                "Backup created: {} ({} bytes)",
                artifact.path.display(),
                artifact.size_bytes
            );
        }

        Commands::Restore { conn, file } => {
            let manager = BackupManager::system();
            manager.connect(conn.profile()).await?;
            manager.restore_backup(&file).await?;
            println!("Restored {} into {}", file.display(), conn.database);
        }

        Commands::ListBackups { backup_dir } => {
            let manager = BackupManager::system();
            let artifacts = manager.list_backups(&backup_dir)?;
            if artifacts.is_empty() {
                println!("No backups in {}", backup_dir.display());
            }
            for artifact in artifacts {
                println!(
                    "{}  {}  {}  {} bytes",
                    artifact.created_at.format("%Y-%m-%d %H:%M:%S"),
                    artifact.database,
                    artifact.format,
                    artifact.size_bytes
                );
            }
        }

        Commands::Service {
            service_type,
            action,
        } => {
            let manager = BackupManager::system();
            let state = manager.service_control(service_type, action).await?;
            println!("{service_type} service is {state}");
        }
    }

    Ok(())
}

async fn run_daemon(bind: &str) -> Result<()> {
    let config = match common::load_config() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load configuration, using defaults: {e}");
            common::PalisadeConfig::default()
        }
    };

    let manager = Arc::new(BackupManager::system());
    manager.log_tool_status().await;

    let daemon = daemon::Daemon::new(manager, config);
    daemon.apply_config().await;

    tokio::select! {
        result = daemon.serve(bind) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
            daemon.shutdown().await;
        }
    }

    Ok(())
}

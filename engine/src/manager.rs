use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::{self, BackupArtifact};
use crate::backup::BackupExecutor;
use crate::common::{BackupFormat, ConnectionProfile, Engine};
use crate::control::{ServiceAction, ServiceController};
use crate::registry::ConnectionRegistry;
use crate::restore::RestoreExecutor;
use crate::runner::{CommandSpec, ProcessRunner, SystemRunner};
use crate::{EngineError, Result};

/// External tools the executors shell out to.
const REQUIRED_TOOLS: [&str; 4] = ["pg_dump", "psql", "mysqldump", "mysql"];

/// Front door of the engine. Owns the connection registry and the executors
/// and enforces the connect-before-use rule for backup and restore.
pub struct BackupManager {
    registry: ConnectionRegistry,
    backup: BackupExecutor,
    restore: RestoreExecutor,
    control: ServiceController,
    runner: Arc<dyn ProcessRunner>,
}

impl BackupManager {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            backup: BackupExecutor::new(Arc::clone(&runner)),
            restore: RestoreExecutor::new(Arc::clone(&runner)),
            control: ServiceController::new(Arc::clone(&runner)),
            runner,
        }
    }

    /// Manager backed by real child processes.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemRunner))
    }

    pub async fn connect(&self, profile: ConnectionProfile) -> Result<ConnectionProfile> {
        self.registry.connect(profile, &*self.runner).await
    }

    pub fn disconnect(&self) {
        self.registry.disconnect();
    }

    pub fn current(&self) -> Option<ConnectionProfile> {
        self.registry.current()
    }

    pub async fn create_backup(
        &self,
        directory: &Path,
        format: BackupFormat,
    ) -> Result<BackupArtifact> {
        let profile = self.registry.current().ok_or(EngineError::NotConnected)?;
        self.backup.create_backup(&profile, directory, format).await
    }

    pub async fn restore_backup(&self, artifact_path: &Path) -> Result<()> {
        let profile = self.registry.current().ok_or(EngineError::NotConnected)?;
        self.restore.restore(&profile, artifact_path).await
    }

    /// Artifacts in the directory, newest first. Does not require a
    /// connection; listing is pure filesystem inspection.
    pub fn list_backups(&self, directory: &Path) -> Result<Vec<BackupArtifact>> {
        artifact::list_backups(directory)
    }

    pub async fn service_control(&self, engine: Engine, action: ServiceAction) -> Result<String> {
        self.control.control(engine, action).await
    }

    /// Logs which of the external dump and client tools are present on this
    /// host. Purely informational; missing tools only fail the operations
    /// that need them.
    pub async fn log_tool_status(&self) {
        for tool in REQUIRED_TOOLS {
            let spec = CommandSpec::new(tool)
                .arg("--version")
                .timeout(Duration::from_secs(5));
            match self.runner.run(&spec).await {
                Ok(output) if output.success() => {
                    info!("Found {tool}: {}", output.stdout.lines().next().unwrap_or("").trim());
                }
                Ok(output) => {
                    warn!("{tool} is present but unhealthy: {}", output.stderr.trim());
                }
                Err(EngineError::ToolNotFound(_)) => {
                    warn!("{tool} not found on PATH; related operations will fail");
                }
                Err(e) => warn!("Could not check {tool}: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRunner;

    fn mysql_profile() -> ConnectionProfile {
        ConnectionProfile {
            engine: Engine::Mysql,
            host: "localhost".to_string(),
            port: 3306,
            database: "shop".to_string(),
            user: "root".to_string(),
            password: Some("secret".to_string()),
        }
    }

    #[tokio::test]
    async fn backup_requires_a_connection() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::succeeding());
        let manager = BackupManager::new(runner.clone() as Arc<dyn ProcessRunner>);

        let err = manager
            .create_backup(dir.path(), BackupFormat::Sql)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_connected");
        // No tool was spawned and no artifact appeared.
        assert!(runner.invocations().is_empty());
        assert!(manager.list_backups(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn restore_requires_a_connection() {
        let manager = BackupManager::new(Arc::new(FakeRunner::succeeding()));
        let err = manager
            .restore_backup(Path::new("/backups/dump.sql"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_connected");
    }

    #[tokio::test]
    async fn connect_backup_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::succeeding());
        let manager = BackupManager::new(runner.clone() as Arc<dyn ProcessRunner>);

        manager.connect(mysql_profile()).await.unwrap();
        let artifact = manager
            .create_backup(dir.path(), BackupFormat::Sql)
            .await
            .unwrap();

        let listed = manager.list_backups(dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, artifact.path);
        assert_eq!(listed[0].database, "shop");

        // The dump ran with the connected profile's credentials.
        let dumps: Vec<_> = runner
            .invocations()
            .into_iter()
            .filter(|spec| spec.program == "mysqldump")
            .collect();
        assert_eq!(dumps.len(), 1);
        assert!(dumps[0].args.contains(&"shop".to_string()));
        assert!(dumps[0].args.contains(&"--password=secret".to_string()));
    }

    #[tokio::test]
    async fn disconnect_blocks_further_backups() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(Arc::new(FakeRunner::succeeding()));

        manager.connect(mysql_profile()).await.unwrap();
        manager.disconnect();
        assert!(manager.current().is_none());

        let err = manager
            .create_backup(dir.path(), BackupFormat::Sql)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_connected");
    }
}

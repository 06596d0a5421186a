use log::{error, info};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{ConnectionProfile, Engine};
use crate::runner::{ProcessRunner, DEFAULT_TOOL_TIMEOUT};
use crate::wrapper::{MysqlClient, Psql};
use crate::{EngineError, Result};

/// Replays SQL dump artifacts into the connected database.
pub struct RestoreExecutor {
    runner: Arc<dyn ProcessRunner>,
    tool_timeout: Duration,
}

impl RestoreExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Restores a .sql artifact into the target database. CSV archives hold
    /// one file per table with no schema, so they are refused here; extract
    /// and load them by hand instead.
    pub async fn restore(&self, profile: &ConnectionProfile, artifact_path: &Path) -> Result<()> {
        if !artifact_path.is_file() {
            return Err(EngineError::Restore(format!(
                "backup file does not exist: {}",
                artifact_path.display()
            )));
        }

        let name = artifact_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.ends_with(".tar.gz") {
            return Err(EngineError::Restore(
                "csv archives cannot be restored automatically; extract the \
                 archive and load the tables manually"
                    .to_string(),
            ));
        }
        if !name.ends_with(".sql") {
            return Err(EngineError::Restore(format!(
                "unrecognized backup format: {name}"
            )));
        }

        info!(
            "Restoring {} into database {}",
            artifact_path.display(),
            profile.database
        );

        let spec = match profile.engine {
            Engine::Postgresql => Psql::execute_file(profile, artifact_path, self.tool_timeout),
            Engine::Mysql => MysqlClient::restore_file(profile, artifact_path, self.tool_timeout),
        };

        let output = self.runner.run(&spec).await?;
        if !output.success() {
            error!(
                "{} exited with {:?}: {}",
                spec.program,
                output.status_code,
                output.stderr.trim()
            );
            return Err(EngineError::Restore(format!(
                "{} failed: {}",
                spec.program,
                output.stderr.trim()
            )));
        }

        info!("Restore of {} completed", artifact_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{exit, FakeRunner};
    use std::fs;

    fn mysql_profile() -> ConnectionProfile {
        ConnectionProfile {
            engine: Engine::Mysql,
            host: "localhost".to_string(),
            port: 3306,
            database: "shop".to_string(),
            user: "root".to_string(),
            password: None,
        }
    }

    #[tokio::test]
    async fn restores_sql_dump_over_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("Backup_shop_20240101_120000.sql");
        fs::write(&dump, "CREATE TABLE t (id int);").unwrap();

        let runner = Arc::new(FakeRunner::succeeding());
        let executor = RestoreExecutor::new(Arc::clone(&runner) as Arc<dyn ProcessRunner>);

        executor.restore(&mysql_profile(), &dump).await.unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].program, "mysql");
        assert_eq!(invocations[0].stdin_file.as_deref(), Some(dump.as_path()));
    }

    #[tokio::test]
    async fn missing_file_is_a_restore_error() {
        let executor = RestoreExecutor::new(Arc::new(FakeRunner::succeeding()));
        let err = executor
            .restore(&mysql_profile(), Path::new("/nonexistent/dump.sql"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "restore_error");
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn csv_archives_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("Backup_shop_20240101_120000.tar.gz");
        fs::write(&archive, "not really a tarball").unwrap();

        let runner = Arc::new(FakeRunner::succeeding());
        let executor = RestoreExecutor::new(Arc::clone(&runner) as Arc<dyn ProcessRunner>);
        let err = executor
            .restore(&mysql_profile(), &archive)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "restore_error");
        // Refused before any tool is spawned.
        assert!(runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn tool_failure_surfaces_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("Backup_shop_20240101_120000.sql");
        fs::write(&dump, "bogus sql").unwrap();

        let runner = FakeRunner::new(|_| Ok(exit(1, "", "ERROR 1064 (42000): syntax error")));
        let executor = RestoreExecutor::new(Arc::new(runner));
        let err = executor
            .restore(&mysql_profile(), &dump)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "restore_error");
        assert!(err.to_string().contains("1064"));
    }
}

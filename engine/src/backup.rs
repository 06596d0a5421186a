use chrono::{Timelike, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{error, info, warn};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::artifact::{self, BackupArtifact};
use crate::common::{BackupFormat, ConnectionProfile, Engine};
use crate::retention;
use crate::runner::{CommandSpec, ProcessRunner, DEFAULT_TOOL_TIMEOUT};
use crate::wrapper::{MysqlClient, MysqlDump, PgDump, Psql};
use crate::{EngineError, Result};

/// Serializes backup runs per (database, directory) target. A second run
/// against a busy target fails fast with BackupInProgress rather than
/// queueing behind the first.
#[derive(Clone, Default)]
pub struct BackupLocks {
    active: Arc<Mutex<HashSet<(String, PathBuf)>>>,
}

impl BackupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, database: &str, directory: &Path) -> Result<BackupGuard> {
        let key = (database.to_string(), directory.to_path_buf());
        let mut active = self.active.lock().unwrap();
        if !active.insert(key.clone()) {
            return Err(EngineError::BackupInProgress {
                database: database.to_string(),
                directory: directory.to_path_buf(),
            });
        }
        Ok(BackupGuard {
            locks: self.clone(),
            key,
        })
    }
}

struct BackupGuard {
    locks: BackupLocks,
    key: (String, PathBuf),
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        self.locks.active.lock().unwrap().remove(&self.key);
    }
}

/// Runs dump tools and hands finished artifacts to the retention enforcer.
pub struct BackupExecutor {
    runner: Arc<dyn ProcessRunner>,
    locks: BackupLocks,
    tool_timeout: Duration,
}

impl BackupExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            locks: BackupLocks::new(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// Creates one backup artifact for the given connection. The directory
    /// is created on demand; on any tool failure the partial output is
    /// removed before the error is returned.
    pub async fn create_backup(
        &self,
        profile: &ConnectionProfile,
        directory: &Path,
        format: BackupFormat,
    ) -> Result<BackupArtifact> {
        let _guard = self.locks.acquire(&profile.database, directory)?;

        fs::create_dir_all(directory)?;

        let created_at = Utc::now();
        let created_at = created_at.with_nanosecond(0).unwrap_or(created_at);
        let file_name = artifact::artifact_name(&profile.database, &created_at, format);
        let path = directory.join(&file_name);

        info!(
            "Starting {format} backup of {} into {}",
            profile.database,
            path.display()
        );

        let result = match format {
            BackupFormat::Sql => self.sql_dump(profile, &path).await,
            BackupFormat::Csv => self.csv_archive(profile, directory, &path).await,
        };

        if let Err(e) = result {
            if path.exists() {
                if let Err(cleanup) = fs::remove_file(&path) {
                    warn!(
                        "Failed to remove partial backup {}: {cleanup}",
                        path.display()
                    );
                }
            }
            return Err(e);
        }

        let size_bytes = fs::metadata(&path)?.len();
        info!("Backup completed: {} ({size_bytes} bytes)", path.display());

        if let Err(e) = retention::enforce(directory) {
            warn!("Retention sweep failed after backup: {e}");
        }

        Ok(BackupArtifact {
            path,
            database: profile.database.clone(),
            created_at,
            format,
            size_bytes,
        })
    }

    async fn sql_dump(&self, profile: &ConnectionProfile, path: &Path) -> Result<()> {
        let spec = match profile.engine {
            Engine::Postgresql => PgDump::dump(profile, path, self.tool_timeout),
            Engine::Mysql => MysqlDump::dump(profile, path, self.tool_timeout),
        };
        self.run_checked(&spec).await
    }

    async fn csv_archive(
        &self,
        profile: &ConnectionProfile,
        directory: &Path,
        archive_path: &Path,
    ) -> Result<()> {
        let tables = self.enumerate_tables(profile).await?;
        if tables.is_empty() {
            warn!("Database {} has no tables to export", profile.database);
        }

        // Staging directory lives next to the artifact so the final rename
        // into the archive stays on one filesystem. Cleaned up on drop.
        let staging = tempfile::Builder::new()
            .prefix("csv_export")
            .tempdir_in(directory)?;

        for table in &tables {
            let csv_path = staging.path().join(format!("{table}.csv"));
            match profile.engine {
                Engine::Postgresql => {
                    let spec =
                        Psql::copy_table_to_csv(profile, table, &csv_path, self.tool_timeout);
                    self.run_checked(&spec).await.map_err(|e| {
                        EngineError::Backup(format!("csv export of table {table} failed: {e}"))
                    })?;
                }
                Engine::Mysql => {
                    let spec = MysqlClient::batch_query(
                        profile,
                        &format!("SELECT * FROM `{table}`"),
                        self.tool_timeout,
                    );
                    let output = self.runner.run(&spec).await?;
                    if !output.success() {
                        return Err(EngineError::Backup(format!(
                            "csv export of table {table} failed: {}",
                            output.stderr.trim()
                        )));
                    }
                    fs::write(&csv_path, tsv_to_csv(&output.stdout))?;
                }
            }
        }

        let archive = File::create(archive_path)?;
        let encoder = GzEncoder::new(archive, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder.append_dir_all(".", staging.path())?;
        let encoder = builder.into_inner()?;
        encoder.finish()?;

        Ok(())
    }

    async fn enumerate_tables(&self, profile: &ConnectionProfile) -> Result<Vec<String>> {
        match profile.engine {
            Engine::Postgresql => {
                let conn_string = profile.connection_string();
                let (client, connection) =
                    tokio_postgres::connect(&conn_string, tokio_postgres::NoTls)
                        .await
                        .map_err(|e| {
                            EngineError::Backup(format!("failed to enumerate tables: {e}"))
                        })?;

                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        error!("Connection error: {e}");
                    }
                });

                let rows = client
                    .query(
                        "SELECT table_name FROM information_schema.tables \
                         WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
                         ORDER BY table_name",
                        &[],
                    )
                    .await
                    .map_err(|e| EngineError::Backup(format!("failed to enumerate tables: {e}")))?;

                Ok(rows.iter().map(|row| row.get(0)).collect())
            }
            Engine::Mysql => {
                let spec = MysqlClient::show_tables(profile, self.tool_timeout);
                let output = self.runner.run(&spec).await?;
                if !output.success() {
                    return Err(EngineError::Backup(format!(
                        "failed to enumerate tables: {}",
                        output.stderr.trim()
                    )));
                }
                Ok(output
                    .stdout
                    .lines()
                    .map(|line| line.trim().to_string())
                    .filter(|line| !line.is_empty())
                    .collect())
            }
        }
    }

    async fn run_checked(&self, spec: &CommandSpec) -> Result<()> {
        let output = self.runner.run(spec).await?;
        if !output.success() {
            error!(
                "{} exited with {:?}: {}",
                spec.program,
                output.status_code,
                output.stderr.trim()
            );
            return Err(EngineError::Backup(format!(
                "{} failed: {}",
                spec.program,
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Re-encodes the mysql client's tab-separated batch output as CSV. In
/// batch mode the client escapes tabs, newlines, NULs, and backslashes
/// inside field data, so raw tabs and newlines are safe separators here.
fn tsv_to_csv(tsv: &str) -> String {
    let mut out = String::new();
    for line in tsv.lines() {
        let fields: Vec<String> = line
            .split('\t')
            .map(|field| csv_field(&unescape_batch_field(field)))
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

fn unescape_batch_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

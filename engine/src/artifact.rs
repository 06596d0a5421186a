use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::common::BackupFormat;
use crate::Result;

/// Timestamp embedded in artifact file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A single completed backup run on disk. Identity is the filesystem path;
/// the file is immutable once written.
#[derive(Debug, Clone, Serialize)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub database: String,
    pub created_at: DateTime<Utc>,
    pub format: BackupFormat,
    pub size_bytes: u64,
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^Backup_(.+)_(\d{8}_\d{6})\.(sql|tar\.gz)$")
            .expect("artifact name pattern is valid")
    })
}

/// Builds the deterministic artifact file name for a backup run.
pub fn artifact_name(database: &str, created_at: &DateTime<Utc>, format: BackupFormat) -> String {
    format!(
        "Backup_{}_{}.{}",
        database,
        created_at.format(TIMESTAMP_FORMAT),
        format.extension()
    )
}

/// Parses an artifact file name back into its components. Returns None for
/// files that do not follow the backup naming convention.
pub fn parse_artifact_name(name: &str) -> Option<(String, DateTime<Utc>, BackupFormat)> {
    let captures = name_pattern().captures(name)?;
    let database = captures.get(1)?.as_str().to_string();
    let created_at = NaiveDateTime::parse_from_str(captures.get(2)?.as_str(), TIMESTAMP_FORMAT)
        .ok()?
        .and_utc();
    let format = match captures.get(3)?.as_str() {
        "sql" => BackupFormat::Sql,
        _ => BackupFormat::Csv,
    };
    Some((database, created_at, format))
}

/// Discovers backup artifacts in a directory, newest first. Entries that do
/// not match the naming convention are ignored.
pub fn discover(directory: &Path) -> Result<Vec<BackupArtifact>> {
    let mut artifacts = Vec::new();

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some((database, created_at, format)) = parse_artifact_name(name) else {
            continue;
        };
        artifacts.push(BackupArtifact {
            path: entry.path(),
            database,
            created_at,
            format,
            size_bytes: entry.metadata()?.len(),
        });
    }

    artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(artifacts)
}

/// Lists backup artifacts in a directory, newest first. Unlike `discover`,
/// a missing directory is an error here because the caller named it
/// explicitly.
pub fn list_backups(directory: &Path) -> Result<Vec<BackupArtifact>> {
    if !directory.is_dir() {
        return Err(crate::EngineError::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("backup directory does not exist: {}", directory.display()),
        )));
    }
    discover(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn name_round_trips() {
        let created_at = Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap();
        let name = artifact_name("mydb", &created_at, BackupFormat::Sql);
        assert_eq!(name, "Backup_mydb_20240315_093000.sql");

        let (database, parsed, format) = parse_artifact_name(&name).unwrap();
        assert_eq!(database, "mydb");
        assert_eq!(parsed, created_at);
        assert_eq!(format, BackupFormat::Sql);
    }

    #[test]
    fn database_names_with_underscores_parse() {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let name = artifact_name("my_prod_db", &created_at, BackupFormat::Csv);
        assert_eq!(name, "Backup_my_prod_db_20240102_030405.tar.gz");

        let (database, parsed, format) = parse_artifact_name(&name).unwrap();
        assert_eq!(database, "my_prod_db");
        assert_eq!(parsed, created_at);
        assert_eq!(format, BackupFormat::Csv);
    }

    #[test]
    fn unrelated_files_are_rejected() {
        assert!(parse_artifact_name("notes.txt").is_none());
        assert!(parse_artifact_name("Backup_mydb.sql").is_none());
        assert!(parse_artifact_name("Backup_mydb_20240101.sql").is_none());
        assert!(parse_artifact_name("Backup_mydb_20240101_000000.zip").is_none());
    }

    #[test]
    fn discover_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        for ts in ["20240101_000000", "20240301_000000", "20240201_000000"] {
            std::fs::write(dir.path().join(format!("Backup_db_{ts}.sql")), "dump").unwrap();
        }
        std::fs::write(dir.path().join("README.md"), "not a backup").unwrap();

        let artifacts = discover(dir.path()).unwrap();
        let names: Vec<_> = artifacts
            .iter()
            .map(|a| a.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "Backup_db_20240301_000000.sql",
                "Backup_db_20240201_000000.sql",
                "Backup_db_20240101_000000.sql",
            ]
        );
    }

    #[test]
    fn list_backups_rejects_missing_directory() {
        let err = list_backups(Path::new("/does/not/exist")).unwrap_err();
        assert_eq!(err.kind(), "io_error");
    }
}

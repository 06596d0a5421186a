use log::{info, warn};
use std::fs;
use std::path::Path;

use crate::artifact;
use crate::Result;

/// Maximum number of backup artifacts kept per target directory.
pub const RETENTION_CAP: usize = 3;

/// Deletes the oldest artifacts beyond the retention cap. Individual
/// deletion failures are logged as warnings and never abort the backup that
/// triggered the sweep; that backup has already succeeded.
pub fn enforce(directory: &Path) -> Result<usize> {
    let artifacts = artifact::discover(directory)?;

    let mut deleted = 0;
    for stale in artifacts.iter().skip(RETENTION_CAP) {
        match fs::remove_file(&stale.path) {
            Ok(()) => {
                info!("Deleted old backup: {}", stale.path.display());
                deleted += 1;
            }
            Err(e) => {
                warn!("Failed to delete old backup {}: {e}", stale.path.display());
            }
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(dir: &Path, timestamps: &[&str]) {
        for ts in timestamps {
            fs::write(dir.join(format!("Backup_db_{ts}.sql")), "dump").unwrap();
        }
    }

    #[test]
    fn keeps_newest_three() {
        let dir = tempfile::tempdir().unwrap();
        seed(
            dir.path(),
            &[
                "20240101_000000",
                "20240102_000000",
                "20240103_000000",
                "20240104_000000",
                "20240105_000000",
            ],
        );

        let deleted = enforce(dir.path()).unwrap();
        assert_eq!(deleted, 2);

        let remaining = artifact::discover(dir.path()).unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(remaining
            .iter()
            .all(|a| a.created_at >= "2024-01-03T00:00:00Z"
                .parse::<chrono::DateTime<chrono::Utc>>()
                .unwrap()));
    }

    #[test]
    fn under_cap_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), &["20240101_000000", "20240102_000000"]);

        assert_eq!(enforce(dir.path()).unwrap(), 0);
        assert_eq!(artifact::discover(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn ignores_files_outside_the_naming_convention() {
        let dir = tempfile::tempdir().unwrap();
        seed(
            dir.path(),
            &[
                "20240101_000000",
                "20240102_000000",
                "20240103_000000",
                "20240104_000000",
            ],
        );
        fs::write(dir.path().join("keep.txt"), "unrelated").unwrap();

        enforce(dir.path()).unwrap();
        assert!(dir.path().join("keep.txt").exists());
        assert!(!dir.path().join("Backup_db_20240101_000000.sql").exists());
    }
}

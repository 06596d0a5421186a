use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Relational database server family. Determines which external tools are
/// invoked and how their arguments are shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Postgresql,
    Mysql,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Postgresql => "postgresql",
            Engine::Mysql => "mysql",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Engine::Postgresql => 5432,
            Engine::Mysql => 3306,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical database connection target. At most one live profile exists per
/// registry; it is replaced wholesale by a connect and cleared by disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub engine: Engine,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
}

impl ConnectionProfile {
    /// Key/value connection string understood by tokio-postgres.
    pub fn connection_string(&self) -> String {
        let mut conn_string = format!(
            "host={} port={} dbname={} user={}",
            self.host, self.port, self.database, self.user
        );

        if let Some(password) = &self.password {
            conn_string.push_str(&format!(" password={password}"));
        }

        conn_string
    }
}

/// Output format of a backup run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackupFormat {
    /// Single full-database text dump.
    #[default]
    Sql,
    /// Per-table CSV exports bundled into one gzipped tar archive.
    Csv,
}

impl BackupFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupFormat::Sql => "sql",
            BackupFormat::Csv => "csv",
        }
    }

    /// File extension of the resulting artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            BackupFormat::Sql => "sql",
            BackupFormat::Csv => "tar.gz",
        }
    }
}

impl fmt::Display for BackupFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cadence of scheduled backups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SchedulePeriod {
    Disabled,
    Hourly,
    Daily,
    Weekly,
}

impl SchedulePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulePeriod::Disabled => "disabled",
            SchedulePeriod::Hourly => "hourly",
            SchedulePeriod::Daily => "daily",
            SchedulePeriod::Weekly => "weekly",
        }
    }

    /// Interval between scheduled runs, or None when disabled.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            SchedulePeriod::Disabled => None,
            SchedulePeriod::Hourly => Some(Duration::from_secs(60 * 60)),
            SchedulePeriod::Daily => Some(Duration::from_secs(24 * 60 * 60)),
            SchedulePeriod::Weekly => Some(Duration::from_secs(7 * 24 * 60 * 60)),
        }
    }
}

impl fmt::Display for SchedulePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide scheduled backup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub period: SchedulePeriod,
    pub directory: PathBuf,
    pub format: BackupFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_default_ports() {
        assert_eq!(Engine::Postgresql.default_port(), 5432);
        assert_eq!(Engine::Mysql.default_port(), 3306);
    }

    #[test]
    fn period_durations() {
        assert_eq!(SchedulePeriod::Disabled.duration(), None);
        assert_eq!(
            SchedulePeriod::Hourly.duration(),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            SchedulePeriod::Weekly.duration(),
            Some(Duration::from_secs(604_800))
        );
    }

    #[test]
    fn connection_string_includes_password_only_when_set() {
        let mut profile = ConnectionProfile {
            engine: Engine::Postgresql,
            host: "localhost".to_string(),
            port: 5432,
            database: "mydb".to_string(),
            user: "admin".to_string(),
            password: None,
        };
        assert_eq!(
            profile.connection_string(),
            "host=localhost port=5432 dbname=mydb user=admin"
        );

        profile.password = Some("hunter2".to_string());
        assert!(profile.connection_string().ends_with("password=hunter2"));
    }

    #[test]
    fn format_extensions() {
        assert_eq!(BackupFormat::Sql.extension(), "sql");
        assert_eq!(BackupFormat::Csv.extension(), "tar.gz");
    }
}

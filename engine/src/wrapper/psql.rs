use std::path::Path;
use std::time::Duration;

use crate::common::ConnectionProfile;
use crate::runner::CommandSpec;

/// Wrapper for the psql utility.
pub struct Psql;

impl Psql {
    fn base(profile: &ConnectionProfile, timeout: Duration) -> CommandSpec {
        let mut spec = CommandSpec::new("psql")
            .arg("--host")
            .arg(&profile.host)
            .arg("--port")
            .arg(profile.port.to_string())
            .arg("--username")
            .arg(&profile.user)
            .arg("--dbname")
            .arg(&profile.database)
            .arg("--no-psqlrc")
            .arg("--quiet")
            .timeout(timeout);

        if let Some(password) = &profile.password {
            spec = spec.env("PGPASSWORD", password);
        }

        spec
    }

    /// Executes a SQL script file against the target database. Stops at the
    /// first failing statement so a broken restore surfaces as an error.
    pub fn execute_file(profile: &ConnectionProfile, file: &Path, timeout: Duration) -> CommandSpec {
        Self::base(profile, timeout)
            .arg("--set")
            .arg("ON_ERROR_STOP=1")
            .arg("--file")
            .arg(file.to_string_lossy())
    }

    /// Exports one table as CSV (with header) into `out_file` using \copy,
    /// which writes on the client side.
    pub fn copy_table_to_csv(
        profile: &ConnectionProfile,
        table: &str,
        out_file: &Path,
        timeout: Duration,
    ) -> CommandSpec {
        let copy = format!(
            "\\copy \"{}\" to '{}' with (format csv, header)",
            table,
            out_file.display()
        );
        Self::base(profile, timeout).arg("--command").arg(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Engine;

    fn profile() -> ConnectionProfile {
        ConnectionProfile {
            engine: Engine::Postgresql,
            host: "localhost".to_string(),
            port: 5432,
            database: "mydb".to_string(),
            user: "admin".to_string(),
            password: None,
        }
    }

    #[test]
    fn execute_file_stops_on_error() {
        let spec = Psql::execute_file(
            &profile(),
            Path::new("/backups/dump.sql"),
            Duration::from_secs(1),
        );
        assert_eq!(spec.program, "psql");
        assert!(spec.args.contains(&"ON_ERROR_STOP=1".to_string()));
        assert!(spec.args.contains(&"/backups/dump.sql".to_string()));
    }

    #[test]
    fn copy_command_quotes_table_name() {
        let spec = Psql::copy_table_to_csv(
            &profile(),
            "orders",
            Path::new("/tmp/orders.csv"),
            Duration::from_secs(1),
        );
        let command = spec.args.last().unwrap();
        assert!(command.starts_with("\\copy \"orders\" to '/tmp/orders.csv'"));
        assert!(command.contains("format csv"));
    }
}

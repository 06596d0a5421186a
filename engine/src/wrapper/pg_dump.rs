use std::path::Path;
use std::time::Duration;

use crate::common::ConnectionProfile;
use crate::runner::CommandSpec;

/// Wrapper for the pg_dump utility.
pub struct PgDump;

impl PgDump {
    /// Builds a plain-format full-database dump into `file`.
    pub fn dump(profile: &ConnectionProfile, file: &Path, timeout: Duration) -> CommandSpec {
        let mut spec = CommandSpec::new("pg_dump")
            .arg("--host")
            .arg(&profile.host)
            .arg("--port")
            .arg(profile.port.to_string())
            .arg("--username")
            .arg(&profile.user)
            .arg("--dbname")
            .arg(&profile.database)
            .arg("--format")
            .arg("p")
            .arg("--file")
            .arg(file.to_string_lossy())
            .timeout(timeout);

        if let Some(password) = &profile.password {
            spec = spec.env("PGPASSWORD", password);
        }

        spec
    }
}

use std::path::Path;
use std::time::Duration;

use crate::common::ConnectionProfile;
use crate::runner::CommandSpec;

/// Wrapper for the mysql client utility. Also serves as the reachability
/// probe for MySQL targets, since the engine carries no MySQL driver.
pub struct MysqlClient;

impl MysqlClient {
    fn base(profile: &ConnectionProfile, timeout: Duration) -> CommandSpec {
        let mut spec = CommandSpec::new("mysql")
            .arg("--host")
            .arg(&profile.host)
            .arg("--port")
            .arg(profile.port.to_string())
            .arg("--user")
            .arg(&profile.user)
            .timeout(timeout);

        if let Some(password) = &profile.password {
            spec = spec.arg(format!("--password={password}"));
        }

        spec
    }

    /// Cheap reachability check against the target database.
    pub fn probe(profile: &ConnectionProfile, timeout: Duration) -> CommandSpec {
        Self::base(profile, timeout)
            .arg("--execute")
            .arg("SELECT 1")
            .arg(&profile.database)
    }

    /// Lists the base tables of the target database, one name per line.
    pub fn show_tables(profile: &ConnectionProfile, timeout: Duration) -> CommandSpec {
        Self::base(profile, timeout)
            .arg("--batch")
            .arg("--skip-column-names")
            .arg("--execute")
            .arg("SHOW TABLES")
            .arg(&profile.database)
    }

    /// Runs a query in batch mode; output is tab-separated with a header row.
    pub fn batch_query(profile: &ConnectionProfile, sql: &str, timeout: Duration) -> CommandSpec {
        Self::base(profile, timeout)
            .arg("--batch")
            .arg("--execute")
            .arg(sql)
            .arg(&profile.database)
    }

    /// Replays a SQL dump file into the target database via stdin.
    pub fn restore_file(profile: &ConnectionProfile, file: &Path, timeout: Duration) -> CommandSpec {
        Self::base(profile, timeout)
            .arg(&profile.database)
            .stdin_from(file)
    }
}

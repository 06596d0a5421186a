use std::path::Path;
use std::time::Duration;

use crate::common::ConnectionProfile;
use crate::runner::CommandSpec;

/// Wrapper for the mysqldump utility.
pub struct MysqlDump;

impl MysqlDump {
    /// Builds a full-database SQL dump with stdout redirected into `file`.
    /// mysqldump has no output-file flag, so the redirection is handled by
    /// the runner.
    pub fn dump(profile: &ConnectionProfile, file: &Path, timeout: Duration) -> CommandSpec {
        let mut spec = CommandSpec::new("mysqldump")
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

        spec.arg(&profile.database).stdout_to(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Engine;

    #[test]
    fn database_is_last_argument_and_stdout_redirects() {
        let profile = ConnectionProfile {
            engine: Engine::Mysql,
            host: "localhost".to_string(),
            port: 3306,
            database: "shop".to_string(),
            user: "root".to_string(),
            password: Some("pw".to_string()),
        };
        let spec = MysqlDump::dump(&profile, Path::new("/backups/shop.sql"), Duration::from_secs(1));
        assert_eq!(spec.program, "mysqldump");
        assert_eq!(spec.args.last().unwrap(), "shop");
        assert!(spec.args.contains(&"--password=pw".to_string()));
        assert_eq!(
            spec.stdout_file.as_deref(),
            Some(Path::new("/backups/shop.sql"))
        );
    }
}

use config::{Config, ConfigError, File};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

const CONFIG_PATHS: [&str; 3] = [
    "/etc/palisade/palisade.toml",
    "~/.config/palisade/palisade.toml",
    "palisade.toml",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PalisadeConfig {
    pub database: DatabaseConfig,
    pub backup: BackupConfig,
}

/// Database to connect to at startup. Left empty, the daemon starts
/// disconnected and waits for a connect request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub engine: String,
    pub host: String,
    pub port: Option<u16>,
    pub name: String,
    pub user: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    /// Directory where artifacts are written and the retention cap applies.
    pub location: String,
    pub format: String,
    pub schedule: String,
}

impl Default for PalisadeConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                engine: "postgresql".to_string(),
                host: "localhost".to_string(),
                port: None,
                name: String::new(),
                user: String::new(),
                password: None,
            },
            backup: BackupConfig {
                location: "backups".to_string(),
                format: "sql".to_string(),
                schedule: "disabled".to_string(),
            },
        }
    }
}

pub fn load_config() -> Result<PalisadeConfig, ConfigError> {
    load_from_paths(&CONFIG_PATHS)
}

fn load_from_paths(paths: &[&str]) -> Result<PalisadeConfig, ConfigError> {
    let config_builder = Config::builder()
        .set_default("database.engine", "postgresql")?
        .set_default("database.host", "localhost")?
        .set_default("database.port", None::<u16>)?
        .set_default("database.name", "")?
        .set_default("database.user", "")?
        .set_default("database.password", None::<String>)?
        .set_default("backup.location", "backups")?
        .set_default("backup.format", "sql")?
        .set_default("backup.schedule", "disabled")?;

    let config_builder = paths.iter().fold(config_builder, |builder, path| {
        let path = shellexpand::full(path).unwrap().into_owned();
        if Path::new(&path).exists() {
            builder.add_source(File::with_name(&path))
        } else {
            builder
        }
    });

    config_builder.build()?.try_deserialize()
}

/// Writes the configuration to the first config file path that accepts it,
/// creating parent directories as needed.
pub fn update_config(config: &PalisadeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let toml_string = toml::to_string_pretty(config)?;

    for path in CONFIG_PATHS {
        let expanded_path = shellexpand::full(path).unwrap().into_owned();
        let path_obj = Path::new(&expanded_path);

        if let Some(parent) = path_obj.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    error!("Failed to create directory {}: {}", parent.display(), e);
                    continue;
                }
            }
        }

        match fs::File::create(path_obj) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(toml_string.as_bytes()) {
                    error!("Failed to write to {expanded_path}: {e}");
                    continue;
                }
                info!("Configuration updated successfully at {expanded_path}");
                return Ok(());
            }
            Err(e) => {
                error!("Failed to create file {expanded_path}: {e}");
                continue;
            }
        }
    }

    Err("Failed to update configuration: could not write to any config file path".into())
}

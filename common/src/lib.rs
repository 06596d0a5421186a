pub mod config;

pub use config::{load_config, update_config, BackupConfig, DatabaseConfig, PalisadeConfig};

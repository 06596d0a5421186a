use log::{debug, error, info};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::common::{ConnectionProfile, Engine};
use crate::runner::ProcessRunner;
use crate::wrapper::MysqlClient;
use crate::{EngineError, Result};

/// Ceiling for the reachability probe performed on connect.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Holds the single live connection profile for the process. All components
/// read the profile through `current()`; only `connect`/`disconnect` mutate
/// it. Nothing is persisted across restarts, callers must re-connect.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    current: Arc<Mutex<Option<ConnectionProfile>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies the target server is reachable with the given credentials,
    /// then replaces the current profile. On probe failure the prior state
    /// is left untouched.
    pub async fn connect(
        &self,
        profile: ConnectionProfile,
        runner: &dyn ProcessRunner,
    ) -> Result<ConnectionProfile> {
        match profile.engine {
            Engine::Postgresql => probe_postgres(&profile).await?,
            Engine::Mysql => probe_mysql(&profile, runner).await?,
        }

        let mut current = self.current.lock().unwrap();
        *current = Some(profile.clone());
        info!(
            "Connected to {} database {} at {}:{}",
            profile.engine, profile.database, profile.host, profile.port
        );
        Ok(profile)
    }

    /// Clears the current profile. A no-op when already disconnected.
    pub fn disconnect(&self) {
        let mut current = self.current.lock().unwrap();
        if let Some(profile) = current.take() {
            info!("Disconnected from database {}", profile.database);
        }
    }

    /// Returns a copy of the active profile, or None when not connected.
    pub fn current(&self) -> Option<ConnectionProfile> {
        self.current.lock().unwrap().clone()
    }
}

async fn probe_postgres(profile: &ConnectionProfile) -> Result<()> {
    let conn_string = profile.connection_string();
    let connect = tokio_postgres::connect(&conn_string, tokio_postgres::NoTls);

    let (client, connection) = tokio::time::timeout(PROBE_TIMEOUT, connect)
        .await
        .map_err(|_| EngineError::Timeout {
            tool: "postgresql connection".to_string(),
        })?
        .map_err(|e| EngineError::Connection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Connection error: {e}");
        }
    });

    let row = client
        .query_one("SELECT version()", &[])
        .await
        .map_err(|e| EngineError::Connection(e.to_string()))?;
    let version: String = row.get(0);
    debug!("PostgreSQL server version: {version}");

    Ok(())
}

async fn probe_mysql(profile: &ConnectionProfile, runner: &dyn ProcessRunner) -> Result<()> {
    let spec = MysqlClient::probe(profile, PROBE_TIMEOUT);
    let output = runner.run(&spec).await?;

    if !output.success() {
        return Err(EngineError::Connection(output.stderr.trim().to_string()));
    }
    Ok(())
}

use clap::ValueEnum;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::common::Engine;
use crate::runner::{CommandSpec, ProcessRunner};
use crate::{EngineError, Result};

/// How long to wait for systemd to settle into the wanted state.
const STATE_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }
}

/// Drives the database server's systemd unit. Only meaningful on Linux
/// hosts with systemd; everywhere else every action reports
/// UnsupportedPlatform without touching the system.
pub struct ServiceController {
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl ServiceController {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            timeout: STATE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn supported() -> bool {
        cfg!(target_os = "linux")
    }

    /// Applies the action to the engine's unit and waits until systemd
    /// reports the expected state. Returns the final reported state.
    pub async fn control(&self, engine: Engine, action: ServiceAction) -> Result<String> {
        if !Self::supported() {
            return Err(EngineError::UnsupportedPlatform);
        }

        let unit = unit_name(engine);
        info!("Running systemctl {} {unit}", action.as_str());

        let spec = CommandSpec::new("systemctl")
            .arg(action.as_str())
            .arg(unit)
            .timeout(self.timeout);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(EngineError::ServiceControl(format!(
                "systemctl {} {unit} failed: {}",
                action.as_str(),
                output.stderr.trim()
            )));
        }

        let wanted = match action {
            ServiceAction::Stop => "inactive",
            ServiceAction::Start | ServiceAction::Restart => "active",
        };
        let state = self.await_state(unit, wanted).await?;
        info!("Unit {unit} is now {state}");
        Ok(state)
    }

    async fn await_state(&self, unit: &str, wanted: &str) -> Result<String> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let spec = CommandSpec::new("systemctl")
                .arg("is-active")
                .arg(unit)
                .timeout(POLL_INTERVAL * 4);
            // is-active exits non-zero for any state other than "active",
            // which is expected while we poll; read stdout either way.
            let output = self.runner.run(&spec).await?;
            let state = output.stdout.trim().to_string();
            if state == wanted {
                return Ok(state);
            }

            if Instant::now() >= deadline {
                warn!("Unit {unit} stuck in state {state:?}, wanted {wanted:?}");
                return Err(EngineError::Timeout {
                    tool: "systemctl".to_string(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

fn unit_name(engine: Engine) -> &'static str {
    match engine {
        Engine::Postgresql => "postgresql",
        Engine::Mysql => "mysql",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(target_os = "linux"))]
    #[tokio::test]
    async fn unsupported_off_linux() {
        use crate::test_support::FakeRunner;

        let controller = ServiceController::new(Arc::new(FakeRunner::succeeding()));
        let err = controller
            .control(Engine::Postgresql, ServiceAction::Start)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unsupported_platform");
    }

    #[cfg(target_os = "linux")]
    mod linux {
        use super::*;
        use crate::test_support::{exit, FakeRunner};
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[tokio::test]
        async fn start_waits_for_active() {
            // First poll reports "activating", second reports "active".
            let polls = AtomicUsize::new(0);
            let runner = FakeRunner::new(move |spec| {
                if spec.args.first().map(String::as_str) == Some("is-active") {
                    if polls.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Ok(exit(3, "activating\n", ""));
                    }
                    return Ok(exit(0, "active\n", ""));
                }
                Ok(exit(0, "", ""))
            });
            let controller = ServiceController::new(Arc::new(runner));

            let state = controller
                .control(Engine::Postgresql, ServiceAction::Start)
                .await
                .unwrap();
            assert_eq!(state, "active");
        }

        #[tokio::test]
        async fn stop_waits_for_inactive() {
            let runner = FakeRunner::new(|spec| {
                if spec.args.first().map(String::as_str) == Some("is-active") {
                    return Ok(exit(3, "inactive\n", ""));
                }
                Ok(exit(0, "", ""))
            });
            let controller = ServiceController::new(Arc::new(runner));

            let state = controller
                .control(Engine::Mysql, ServiceAction::Stop)
                .await
                .unwrap();
            assert_eq!(state, "inactive");
        }

        #[tokio::test]
        async fn failed_action_surfaces_stderr() {
            let runner = FakeRunner::new(|spec| {
                if spec.args.first().map(String::as_str) == Some("is-active") {
                    return Ok(exit(0, "active\n", ""));
                }
                Ok(exit(1, "", "Failed to restart mysql.service: access denied"))
            });
            let controller = ServiceController::new(Arc::new(runner));

            let err = controller
                .control(Engine::Mysql, ServiceAction::Restart)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "service_control_error");
            assert!(err.to_string().contains("access denied"));
        }

        #[tokio::test]
        async fn stuck_unit_times_out() {
            let runner = FakeRunner::new(|spec| {
                if spec.args.first().map(String::as_str) == Some("is-active") {
                    return Ok(exit(3, "failed\n", ""));
                }
                Ok(exit(0, "", ""))
            });
            let controller =
                ServiceController::new(Arc::new(runner)).with_timeout(Duration::from_millis(50));

            let err = controller
                .control(Engine::Postgresql, ServiceAction::Start)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "timeout");
        }
    }
}

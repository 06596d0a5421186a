use async_trait::async_trait;
use log::{debug, warn};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::{EngineError, Result};

/// Default ceiling for a single external tool invocation. Dumps of large
/// databases can take minutes; anything past this is considered hung.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(600);

/// Description of one external tool invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    /// Redirect the child's stdout into this file instead of capturing it.
    pub stdout_file: Option<PathBuf>,
    /// Feed this file to the child's stdin.
    pub stdin_file: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<str>) -> Self {
        Self {
            program: program.as_ref().to_string(),
            args: Vec::new(),
            envs: Vec::new(),
            stdout_file: None,
            stdin_file: None,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.envs
            .push((key.as_ref().to_string(), value.as_ref().to_string()));
        self
    }

    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_file = Some(path.into());
        self
    }

    pub fn stdin_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured result of an external tool invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Executes external tool invocations. The dump/restore/service-control
/// protocol logic is written against this trait so it can be exercised with
/// a scripted runner instead of spawning real processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Runner backed by real child processes.
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.envs {
            cmd.env(key, value);
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());

        if let Some(path) = &spec.stdout_file {
            let file = std::fs::File::create(path)?;
            cmd.stdout(Stdio::from(file));
        }
        if let Some(path) = &spec.stdin_file {
            let file = std::fs::File::open(path)?;
            cmd.stdin(Stdio::from(file));
        }

        // If the invoking future is dropped or the timeout fires, the child
        // must not be left running.
        cmd.kill_on_drop(true);

        debug!("Running {} {:?}", spec.program, spec.args);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::ToolNotFound(spec.program.clone()),
            _ => EngineError::Io(e),
        })?;

        let output = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(EngineError::Io)?,
            Err(_) => {
                warn!(
                    "{} did not finish within {:?}, terminating it",
                    spec.program, spec.timeout
                );
                return Err(EngineError::Timeout {
                    tool: spec.program.clone(),
                });
            }
        };

        Ok(CommandOutput {
            status_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let spec = CommandSpec::new("sh").arg("-c").arg("echo hello; exit 0");
        let output = SystemRunner.run(&spec).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let spec = CommandSpec::new("sh").arg("-c").arg("echo oops >&2; exit 3");
        let output = SystemRunner.run(&spec).await.unwrap();
        assert!(!output.success());
        assert_eq!(output.status_code, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn missing_tool_is_distinguishable() {
        let spec = CommandSpec::new("definitely-not-a-real-tool-xyz");
        let err = SystemRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, EngineError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(50));
        let err = SystemRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
    }

    #[tokio::test]
    async fn stdout_redirects_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let spec = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo redirected")
            .stdout_to(&path);
        let output = SystemRunner.run(&spec).await.unwrap();
        assert!(output.success());
        assert!(output.stdout.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "redirected");
    }
}

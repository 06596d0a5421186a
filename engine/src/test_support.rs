//! Scripted process runner for exercising the executors without spawning
//! real external tools.

use async_trait::async_trait;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;

use crate::runner::{CommandOutput, CommandSpec, ProcessRunner};
use crate::Result;

type Script = dyn Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync;

/// Runner that records every invocation and answers from a script closure.
pub struct FakeRunner {
    script: Box<Script>,
    delay: Duration,
    invocations: Mutex<Vec<CommandSpec>>,
}

impl FakeRunner {
    pub fn new(script: impl Fn(&CommandSpec) -> Result<CommandOutput> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Runner whose every invocation succeeds. Dump tools that write an
    /// output file (pg_dump --file, or a stdout redirection) get a small
    /// placeholder artifact written for them.
    pub fn succeeding() -> Self {
        Self::new(|spec| {
            write_expected_output(spec)?;
            Ok(exit(0, "", ""))
        })
    }

    /// Makes every invocation take this long before answering, to widen
    /// race windows in concurrency tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn invocations(&self) -> Vec<CommandSpec> {
        self.invocations.lock().unwrap().clone()
    }

    /// Number of recorded invocations of the given program.
    pub fn runs_of(&self, program: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|spec| spec.program == program)
            .count()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.invocations.lock().unwrap().push(spec.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(spec)
    }
}

/// Builds a canned command result.
pub fn exit(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        status_code: Some(code),
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

/// Writes a placeholder file wherever the invocation expects the tool to
/// produce output, mirroring what the real tool would leave behind.
pub fn write_expected_output(spec: &CommandSpec) -> Result<()> {
    if let Some(path) = &spec.stdout_file {
        fs::write(path, b"-- placeholder dump\n")?;
    }
    if spec.program == "pg_dump" {
        if let Some(index) = spec.args.iter().position(|a| a == "--file") {
            if let Some(path) = spec.args.get(index + 1) {
                fs::write(path, b"-- placeholder dump\n")?;
            }
        }
    }
    Ok(())
}

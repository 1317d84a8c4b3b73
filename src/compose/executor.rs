use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// A single external command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Added on top of the inherited process environment
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            env: BTreeMap::new(),
            working_dir: None,
            timeout,
        }
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env = env.clone();
        self
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// The command line as it would be typed into a shell
    pub fn command_line(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

/// Captured result of an executed command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// None when the process was killed by a signal or timed out
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Trait for running external commands
///
/// Test runs only talk to the outside world through this trait, which keeps
/// the orchestration testable without a container runtime.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the invocation to completion and capture its output
    ///
    /// Errors are reserved for commands that could not be started at all.
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// CommandExecutor backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!("Executing: {}", invocation.command_line());

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let child = command
            .spawn()
            .with_context(|| format!("Failed to start '{}'", invocation.program))?;

        // Dropping the wait future on timeout kills the child
        match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.context("Failed to wait for command")?;
                Ok(CommandOutput {
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    duration: start.elapsed(),
                    timed_out: false,
                })
            }
            Err(_) => Ok(CommandOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: format!(
                    "Command timed out after {}s",
                    invocation.timeout.as_secs()
                ),
                duration: start.elapsed(),
                timed_out: true,
            }),
        }
    }
}

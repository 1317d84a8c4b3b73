use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::executor::{CommandExecutor, CommandOutput, Invocation};
use super::template::write_compose_file;
use crate::config::{
    COMPOSE_BINARY, OUTPUT_LOG_FILE, PROJECT_SUFFIX_LEN, RESULT_FILE_NAME, TEARDOWN_TIMEOUT,
};
use crate::setup::{CommandSpec, TestConfig};

/// Stage of a test run a command belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    Test,
    After,
    Teardown,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::Test => "test",
            Phase::After => "after",
            Phase::Teardown => "teardown",
        }
    }
}

/// Outcome of one executed command
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    pub phase: Phase,
    pub command: String,
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    pub timed_out: bool,
    pub duration_ms: u64,
    /// Set when the command could not be started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub stdout: String,
    #[serde(skip)]
    pub stderr: String,
}

impl CommandRecord {
    fn from_output(phase: Phase, command: String, output: CommandOutput) -> Self {
        Self {
            phase,
            command,
            exit_code: output.exit_code,
            succeeded: output.success(),
            timed_out: output.timed_out,
            duration_ms: output.duration.as_millis() as u64,
            error: None,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }

    fn not_started(phase: Phase, command: String, error: &anyhow::Error) -> Self {
        Self {
            phase,
            command,
            exit_code: None,
            succeeded: false,
            timed_out: false,
            duration_ms: 0,
            error: Some(format!("{:#}", error)),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// Heading used when the command output is reported
    pub fn title(&self) -> String {
        format!("{}: {}", self.phase.label(), self.command)
    }

    /// Combined stdout and stderr
    pub fn output(&self) -> String {
        let mut output = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&self.stderr);
        }
        if let Some(error) = &self.error {
            output.push_str(error);
        }
        output
    }

    fn failure_message(&self) -> String {
        if let Some(error) = &self.error {
            format!("could not run '{}': {}", self.command, error)
        } else if self.timed_out {
            format!("'{}' timed out", self.command)
        } else if let Some(code) = self.exit_code {
            format!("'{}' exited with code {}", self.command, code)
        } else {
            format!("'{}' was terminated by a signal", self.command)
        }
    }
}

/// Result of a single test
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub testset: String,
    pub test: String,
    /// First failure of the run, None if the test passed
    pub failure: Option<String>,
    pub records: Vec<CommandRecord>,
    pub duration: Duration,
    pub test_dir: PathBuf,
}

impl TestOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// The result file structure written next to the test output
#[derive(Debug, Serialize)]
struct TestResultFile<'a> {
    testset: &'a str,
    test: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<&'a str>,
    started_at: String,   // ISO 8601
    completed_at: String, // ISO 8601
    duration_ms: u64,
    commands: &'a [CommandRecord],
}

/// A single test of a test set, executed in its own compose project
#[derive(Debug, Clone)]
pub struct TestRun {
    pub testset: String,
    pub name: String,
    pub config: TestConfig,
}

impl TestRun {
    pub fn new(testset: impl Into<String>, name: impl Into<String>, config: TestConfig) -> Self {
        Self {
            testset: testset.into(),
            name: name.into(),
            config,
        }
    }

    /// Directory holding the rendered compose file and the test output
    pub fn test_dir(&self) -> PathBuf {
        self.config.base_dir().join(&self.testset).join(&self.name)
    }

    /// Run the test
    ///
    /// 1. Render the compose template into the test directory
    /// 2. Run `test_before` commands on the host
    /// 3. Run every test command in the test service, stopping at the first failure
    /// 4. Run `test_after` commands on the host
    /// 5. Tear the compose project down
    ///
    /// Failures of any step end up in the returned outcome.
    pub async fn run(&self, executor: &dyn CommandExecutor) -> TestOutcome {
        let started_at = Utc::now();
        let start = Instant::now();
        info!("Starting test {}/{}", self.testset, self.name);

        let mut outcome = TestOutcome {
            testset: self.testset.clone(),
            test: self.name.clone(),
            failure: None,
            records: Vec::new(),
            duration: Duration::ZERO,
            test_dir: self.test_dir(),
        };

        match self.prepare(&outcome.test_dir).await {
            Ok(compose_file) => self.execute(executor, &compose_file, &mut outcome).await,
            Err(e) => outcome.failure = Some(format!("{:#}", e)),
        }

        outcome.duration = start.elapsed();
        match &outcome.failure {
            None => info!(
                "Test {}/{} succeeded in {:.2}s",
                self.testset,
                self.name,
                outcome.duration.as_secs_f64()
            ),
            Some(failure) => warn!("Test {}/{} failed: {}", self.testset, self.name, failure),
        }

        if let Err(e) = write_result(&outcome, started_at).await {
            warn!("Failed to write result file for {}: {:#}", self.name, e);
        }
        outcome
    }

    /// Create the test directory and render the compose file into it
    async fn prepare(&self, test_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(test_dir)
            .await
            .with_context(|| format!("Failed to create test directory {}", test_dir.display()))?;

        let template = self
            .config
            .compose_template_path()
            .context("No docker_compose_template configured")?;

        write_compose_file(&template, test_dir, &self.config.environment).await
    }

    async fn execute(
        &self,
        executor: &dyn CommandExecutor,
        compose_file: &Path,
        outcome: &mut TestOutcome,
    ) {
        let meta = &self.config.meta;
        let project = project_name(&self.testset, &self.name);
        debug!("Using compose project {} for {}", project, self.name);

        for command in &meta.test_before {
            let invocation = self.host_invocation(command, &outcome.test_dir);
            if !Self::run_step(executor, Phase::Before, invocation, outcome).await {
                break;
            }
        }

        if outcome.succeeded() {
            let commands: Vec<Option<&CommandSpec>> = if meta.test_commands.is_empty() {
                vec![None]
            } else {
                meta.test_commands.iter().map(Some).collect()
            };
            for command in commands {
                let invocation = self.test_invocation(&project, compose_file, command);
                if !Self::run_step(executor, Phase::Test, invocation, outcome).await {
                    break;
                }
            }
        }

        for command in &meta.test_after {
            let invocation = self.host_invocation(command, &outcome.test_dir);
            Self::run_step(executor, Phase::After, invocation, outcome).await;
        }

        let teardown = Invocation {
            timeout: TEARDOWN_TIMEOUT,
            ..self.compose_invocation(
                &project,
                compose_file,
                vec!["down".to_string(), "-v".to_string()],
            )
        };
        Self::run_step(executor, Phase::Teardown, Ok(teardown), outcome).await;
    }

    /// Execute one command and record it; returns whether it succeeded
    async fn run_step(
        executor: &dyn CommandExecutor,
        phase: Phase,
        invocation: Result<Invocation>,
        outcome: &mut TestOutcome,
    ) -> bool {
        let record = match invocation {
            Err(e) => CommandRecord::not_started(phase, String::new(), &e),
            Ok(invocation) => {
                let command = invocation.command_line();
                match executor.execute(&invocation).await {
                    Ok(output) => CommandRecord::from_output(phase, command, output),
                    Err(e) => CommandRecord::not_started(phase, command, &e),
                }
            }
        };

        if let Err(e) = append_output_log(&outcome.test_dir, &record).await {
            warn!("Failed to append to output log: {:#}", e);
        }

        let succeeded = record.succeeded;
        if !succeeded {
            if phase == Phase::Teardown {
                // Leftover containers do not change the test verdict
                warn!(
                    "Teardown of {}/{} failed: {}",
                    outcome.testset,
                    outcome.test,
                    record.failure_message()
                );
            } else if outcome.failure.is_none() {
                outcome.failure = Some(record.failure_message());
            }
        }
        outcome.records.push(record);
        succeeded
    }

    fn host_invocation(&self, command: &CommandSpec, test_dir: &Path) -> Result<Invocation> {
        let mut argv = command.host_argv()?;
        let program = argv.remove(0);
        Ok(
            Invocation::new(program, argv, self.config.command_timeout())
                .with_env(&self.config.environment)
                .in_dir(test_dir),
        )
    }

    fn test_invocation(
        &self,
        project: &str,
        compose_file: &Path,
        command: Option<&CommandSpec>,
    ) -> Result<Invocation> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        for (key, value) in &self.config.environment {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.config.meta.test_service.clone());
        if let Some(command) = command {
            args.extend(command.container_argv(self.config.meta.test_shell)?);
        }
        Ok(self.compose_invocation(project, compose_file, args))
    }

    fn compose_invocation(
        &self,
        project: &str,
        compose_file: &Path,
        args: Vec<String>,
    ) -> Invocation {
        // compose runs inside the test directory, so `-f` only names the file
        let (dir, file_name) = match (compose_file.parent(), compose_file.file_name()) {
            (Some(dir), Some(file_name)) => (Some(dir), file_name.to_string_lossy().into_owned()),
            _ => (None, compose_file.to_string_lossy().into_owned()),
        };
        let mut full_args = vec![
            "-p".to_string(),
            project.to_string(),
            "-f".to_string(),
            file_name,
        ];
        full_args.extend(args);

        let mut invocation = Invocation::new(COMPOSE_BINARY, full_args, self.config.command_timeout())
            .with_env(&self.config.environment);
        if let Some(dir) = dir {
            invocation = invocation.in_dir(dir);
        }
        invocation
    }
}

/// Compose project name unique to this run of the test
///
/// Only lowercase ASCII letters and digits survive, which every compose
/// version accepts.
pub fn project_name(testset: &str, test: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let base: String = testset
        .chars()
        .chain(test.chars())
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    format!("{}{}", base, &suffix[..PROJECT_SUFFIX_LEN])
}

async fn append_output_log(test_dir: &Path, record: &CommandRecord) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(test_dir.join(OUTPUT_LOG_FILE))
        .await
        .context("Failed to open output log")?;

    let exit = match record.exit_code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    };
    let entry = format!(
        "### {}\n### exit code: {}, duration: {}ms\n{}\n",
        record.title(),
        exit,
        record.duration_ms,
        record.output()
    );
    file.write_all(entry.as_bytes())
        .await
        .context("Failed to write output log")?;
    file.flush().await.context("Failed to flush output log")?;
    Ok(())
}

async fn write_result(outcome: &TestOutcome, started_at: DateTime<Utc>) -> Result<()> {
    let result = TestResultFile {
        testset: &outcome.testset,
        test: &outcome.test,
        status: if outcome.succeeded() { "success" } else { "failed" },
        failure: outcome.failure.as_deref(),
        started_at: started_at.to_rfc3339(),
        completed_at: Utc::now().to_rfc3339(),
        duration_ms: outcome.duration.as_millis() as u64,
        commands: &outcome.records,
    };

    let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
    fs::write(outcome.test_dir.join(RESULT_FILE_NAME), json)
        .await
        .context("Failed to write result file")?;
    Ok(())
}

//! High-level runner API for intmaniac.
//!
//! This module ties configuration loading, test set construction and the
//! group runner together. It is the primary API for the CLI and for tests.

use anyhow::{Context, Result, bail};
use derive_builder::Builder;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::compose::{CommandExecutor, ProcessExecutor};
use crate::config::{DEFAULT_CONFIG_FILE, DEFAULT_OUTPUT_DIR_NAME};
use crate::coordination::{GroupRunner, RunOutcome, TestSetSpec, build_test_set_groups};
use crate::output::{self, OutputFormat};
use crate::setup::{load_setup, output_format, prepare_overrides};

/// Arguments for a test run
#[derive(Builder)]
pub struct RunArgs {
    #[builder(setter(into), default = "PathBuf::from(DEFAULT_CONFIG_FILE)")]
    pub config_file: PathBuf,
    /// `KEY=VALUE` settings added to every test environment
    #[builder(default)]
    pub env: Vec<String>,
    /// Must exist already, see [`prepare_output_dir`]
    #[builder(setter(into))]
    pub output_dir: PathBuf,
    #[builder(default)]
    pub quiet: bool,
    #[builder(default)]
    pub dry_run: bool,
    #[builder(default = "Arc::new(ProcessExecutor)")]
    pub executor: Arc<dyn CommandExecutor>,
}

/// Result of a test run
#[derive(Debug)]
pub struct RunResult {
    pub succeeded: bool,
    pub output_format: OutputFormat,
    /// Planned groups of test sets
    pub groups: Vec<Vec<TestSetSpec>>,
    /// None for dry runs
    pub outcome: Option<RunOutcome>,
}

impl RunResult {
    /// Print the test protocol of all test sets that ran
    pub fn write_protocol<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let reports = self
            .outcome
            .as_ref()
            .map(|outcome| outcome.reports.as_slice())
            .unwrap_or_default();
        output::write_protocol(self.output_format, reports, out)
    }

    /// Describe the planned groups, one line per test
    pub fn write_plan<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for (step, group) in self.groups.iter().enumerate() {
            writeln!(out, "Group {}:", step)?;
            for set in group {
                writeln!(out, "  {}", set.name)?;
                for test in &set.tests {
                    let commands: Vec<String> = test
                        .config
                        .meta
                        .test_commands
                        .iter()
                        .map(ToString::to_string)
                        .collect();
                    writeln!(
                        out,
                        "    {} (service {}): {}",
                        test.name,
                        test.config.meta.test_service,
                        if commands.is_empty() {
                            "<service default>".to_string()
                        } else {
                            commands.join("; ")
                        }
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Make sure the output directory exists
///
/// Defaults to `intmaniac` below the current working directory. Relative
/// paths are resolved against the current working directory, so the result
/// is always absolute. Fails when the path exists but is not a directory.
pub async fn prepare_output_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    let dir = dir.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR_NAME));
    let dir = std::path::absolute(&dir)
        .with_context(|| format!("Failed to resolve output directory {}", dir.display()))?;

    match fs::metadata(&dir).await {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => bail!("Output path {} is not a directory", dir.display()),
        Err(_) => fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?,
    }

    debug!("Using output directory {}", dir.display());
    Ok(dir)
}

/// Run all configured test sets
///
/// 1. Load the configuration file and select the protocol format
/// 2. Build the command line override layer
/// 3. Build the groups of test sets
/// 4. Run the groups, unless this is a dry run
///
/// # Example
///
/// ```no_run
/// use intmaniac::runner::{RunArgsBuilder, prepare_output_dir, run_tests};
///
/// # async fn example() -> anyhow::Result<()> {
/// let output_dir = prepare_output_dir(None).await?;
/// let args = RunArgsBuilder::default()
///     .config_file("intmaniac.yaml")
///     .env(vec!["IMAGE=app:latest".to_string()])
///     .output_dir(output_dir)
///     .build()?;
///
/// let result = run_tests(args).await?;
/// result.write_protocol(&mut std::io::stdout())?;
/// # Ok(())
/// # }
/// ```
pub async fn run_tests(args: RunArgs) -> Result<RunResult> {
    let setup = load_setup(&args.config_file).await?;
    let output_format = output_format(&setup)?;
    let overrides = prepare_overrides(&args.config_file, &args.output_dir, &args.env)?;

    let groups = build_test_set_groups(&setup, &overrides)?;
    info!(
        "Configured {} groups with {} test sets",
        groups.len(),
        groups.iter().map(Vec::len).sum::<usize>()
    );

    if args.dry_run {
        return Ok(RunResult {
            succeeded: true,
            output_format,
            groups,
            outcome: None,
        });
    }

    let runner = GroupRunner::new(args.executor, args.quiet);
    let outcome = runner.run_groups(groups.clone()).await;

    Ok(RunResult {
        succeeded: outcome.succeeded,
        output_format,
        groups,
        outcome: Some(outcome),
    })
}

/// Path of the root log file inside the output directory
pub fn root_log_path(output_dir: &Path) -> PathBuf {
    output_dir.join(crate::config::ROOT_LOG_FILE)
}

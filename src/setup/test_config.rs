use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, de};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_OUTPUT_DIR_NAME, DEFAULT_TEST_SERVICE, SHELL};

/// Fully merged configuration of a single test
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub meta: Meta,
    /// Variables passed to the compose template, host commands and the
    /// test container
    #[serde(default, deserialize_with = "stringify_environment")]
    pub environment: BTreeMap<String, String>,
}

/// Settings steering how a test is executed
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Meta {
    #[serde(rename = "_configfile", default)]
    pub config_file: Option<PathBuf>,
    #[serde(default)]
    pub test_basedir: Option<PathBuf>,
    #[serde(default)]
    pub docker_compose_template: Option<PathBuf>,
    #[serde(default = "default_test_service")]
    pub test_service: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub test_commands: Vec<CommandSpec>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub test_before: Vec<CommandSpec>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub test_after: Vec<CommandSpec>,
    #[serde(default)]
    pub test_shell: bool,
    /// Per-command timeout in seconds, 0 selects the default
    #[serde(default)]
    pub test_timeout: Option<u64>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            config_file: None,
            test_basedir: None,
            docker_compose_template: None,
            test_service: default_test_service(),
            test_commands: Vec::new(),
            test_before: Vec::new(),
            test_after: Vec::new(),
            test_shell: false,
            test_timeout: None,
        }
    }
}

fn default_test_service() -> String {
    DEFAULT_TEST_SERVICE.to_string()
}

/// A command either given as one line or as an argument vector
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    Line(String),
    Argv(Vec<String>),
}

impl CommandSpec {
    /// Argument vector for a command executed inside the test container
    ///
    /// Lines are split like a POSIX shell would split them, or handed to
    /// `sh -c` unchanged when `shell` is set.
    pub fn container_argv(&self, shell: bool) -> Result<Vec<String>> {
        match self {
            CommandSpec::Line(line) if shell => {
                Ok(vec![SHELL.to_string(), "-c".to_string(), line.clone()])
            }
            CommandSpec::Line(line) => shell_words::split(line)
                .with_context(|| format!("Failed to split command line: {}", line)),
            CommandSpec::Argv(argv) => Ok(argv.clone()),
        }
    }

    /// Argument vector for a command executed on the host
    ///
    /// Lines always run through `sh -c` so pipes and redirections work.
    pub fn host_argv(&self) -> Result<Vec<String>> {
        let argv = self.container_argv(true)?;
        if argv.is_empty() {
            bail!("Empty command");
        }
        Ok(argv)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Line(line) => f.write_str(line),
            CommandSpec::Argv(argv) => f.write_str(&shell_words::join(argv)),
        }
    }
}

impl TestConfig {
    /// Convert a merged configuration value
    pub fn from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value).context("Invalid test configuration")
    }

    /// Timeout applied to every command of the test
    ///
    /// A missing or zero `test_timeout` means the default timeout.
    pub fn command_timeout(&self) -> Duration {
        self.meta
            .test_timeout
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT)
    }

    /// Directory below which test artifacts are written
    pub fn base_dir(&self) -> PathBuf {
        self.meta
            .test_basedir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR_NAME))
    }

    /// Location of the compose template
    ///
    /// Relative template paths are resolved against the directory of the
    /// configuration file.
    pub fn compose_template_path(&self) -> Option<PathBuf> {
        let template = self.meta.docker_compose_template.as_ref()?;
        if template.is_absolute() {
            return Some(template.clone());
        }
        let config_dir = self
            .meta
            .config_file
            .as_deref()
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new(""));
        Some(config_dir.join(template))
    }
}

/// Text of a scalar YAML value, None for sequences, mappings and tagged values
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn stringify_environment<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Mapping>::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .iter()
        .map(|(key, value)| -> Result<(String, String), D::Error> {
            let key = match key {
                Value::Null => None,
                key => scalar_to_string(key),
            }
            .ok_or_else(|| {
                <D::Error as de::Error>::custom(format!(
                    "environment variable name {:?} must be a scalar",
                    key
                ))
            })?;
            let text = scalar_to_string(value).ok_or_else(|| {
                <D::Error as de::Error>::custom(format!(
                    "environment variable '{}' must be a scalar value",
                    key
                ))
            })?;
            Ok((key, text))
        })
        .collect()
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<CommandSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    // A top level list is always a list of commands; a nested list is argv
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<CommandSpec>),
        One(String),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(commands)) => commands,
        Some(OneOrMany::One(line)) => vec![CommandSpec::Line(line)],
    })
}

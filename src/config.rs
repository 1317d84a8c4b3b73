//! Configuration constants for the test runner
//!
//! This module centralizes the defaults and file names used throughout
//! the application.

use std::time::Duration;

// ============================================================================
// Command Line Defaults
// ============================================================================

pub const DEFAULT_CONFIG_FILE: &str = "./intmaniac.yaml";

/// Name of the output directory created below the working directory when
/// `--temp-output-dir` is not given
pub const DEFAULT_OUTPUT_DIR_NAME: &str = "intmaniac";

/// Log file written into the output directory
pub const ROOT_LOG_FILE: &str = "root.log";

// ============================================================================
// Test Configuration Defaults
// ============================================================================

/// Compose service the test commands are executed in
pub const DEFAULT_TEST_SERVICE: &str = "test-service";

/// Upper bound for a single command of a test run
///
/// Set to 30 minutes because a `docker-compose run` may have to pull and
/// start every dependency of the test service before the test command itself
/// gets to run. Tests can lower or raise it with `meta.test_timeout`.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Timeout for tearing down a compose project after a test
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// ============================================================================
// Test Directory Layout
// ============================================================================

pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

pub const OUTPUT_LOG_FILE: &str = "output.log";

pub const RESULT_FILE_NAME: &str = "result.json";

/// Length of the random suffix appended to compose project names
pub const PROJECT_SUFFIX_LEN: usize = 8;

/// Executable used to drive compose environments
pub const COMPOSE_BINARY: &str = "docker-compose";

/// Shell used for host commands and `test_shell` container commands
pub const SHELL: &str = "sh";

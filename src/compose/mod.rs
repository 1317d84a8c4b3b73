//! Test execution against docker-compose environments

pub mod executor;
pub mod template;
pub mod testrun;

#[cfg(test)]
pub mod testing;

pub use executor::{CommandExecutor, CommandOutput, Invocation, ProcessExecutor};
pub use testrun::{CommandRecord, Phase, TestOutcome, TestRun};

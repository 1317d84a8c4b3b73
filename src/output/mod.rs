//! Test protocol reporters

pub mod teamcity;
pub mod text;

use anyhow::Result;
use std::io::{self, Write};
use std::time::Duration;

use crate::coordination::TestSetReport;

pub use teamcity::TeamCityReporter;
pub use text::TextReporter;

/// Heading printed before the dumps of all test sets
pub const PROTOCOL_HEADING: &str = "TEST PROTOCOL";

/// Supported protocol formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    TeamCity,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "base" => Ok(OutputFormat::Text),
            "teamcity" => Ok(OutputFormat::TeamCity),
            _ => Err(anyhow::anyhow!(
                "Unsupported output format: {}. Supported formats: text, teamcity",
                s
            )),
        }
    }
}

/// Receives the structure of a test protocol
///
/// Test set reports drive a reporter through suites, tests and blocks of
/// command output; implementations decide how that looks on the wire.
pub trait Reporter {
    fn suite_open(&mut self, name: &str) -> io::Result<()>;

    fn suite_close(&mut self, name: &str) -> io::Result<()>;

    fn test_open(&mut self, name: &str) -> io::Result<()>;

    /// Mark the currently open test as failed
    fn test_failed(&mut self, name: &str, message: &str) -> io::Result<()>;

    fn test_close(&mut self, name: &str, duration: Duration) -> io::Result<()>;

    /// A titled chunk of captured output
    fn block(&mut self, title: &str, content: &str) -> io::Result<()>;

    /// A free-standing message
    fn message(&mut self, text: &str) -> io::Result<()>;
}

/// Print the protocol heading followed by every report
pub fn write_protocol<W: Write>(
    format: OutputFormat,
    reports: &[TestSetReport],
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "{}", PROTOCOL_HEADING)?;
    match format {
        OutputFormat::Text => dump_all(&mut TextReporter::new(out), reports),
        OutputFormat::TeamCity => dump_all(&mut TeamCityReporter::new(out), reports),
    }
}

fn dump_all(reporter: &mut dyn Reporter, reports: &[TestSetReport]) -> io::Result<()> {
    for report in reports {
        report.dump(reporter)?;
    }
    Ok(())
}

use std::io::{self, Write};
use std::time::Duration;

use super::Reporter;

/// Protocol as TeamCity service messages
pub struct TeamCityReporter<W: Write> {
    out: W,
}

impl<W: Write> TeamCityReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn service_message(&mut self, name: &str, attributes: &[(&str, &str)]) -> io::Result<()> {
        write!(self.out, "##teamcity[{}", name)?;
        for (key, value) in attributes {
            write!(self.out, " {}='{}'", key, escape(value))?;
        }
        writeln!(self.out, "]")
    }
}

/// Escape a value for use inside a service message attribute
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => escaped.push_str("||"),
            '\'' => escaped.push_str("|'"),
            '\n' => escaped.push_str("|n"),
            '\r' => escaped.push_str("|r"),
            '[' => escaped.push_str("|["),
            ']' => escaped.push_str("|]"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl<W: Write> Reporter for TeamCityReporter<W> {
    fn suite_open(&mut self, name: &str) -> io::Result<()> {
        self.service_message("testSuiteStarted", &[("name", name)])
    }

    fn suite_close(&mut self, name: &str) -> io::Result<()> {
        self.service_message("testSuiteFinished", &[("name", name)])
    }

    fn test_open(&mut self, name: &str) -> io::Result<()> {
        self.service_message("testStarted", &[("name", name)])
    }

    fn test_failed(&mut self, name: &str, message: &str) -> io::Result<()> {
        self.service_message("testFailed", &[("name", name), ("message", message)])
    }

    fn test_close(&mut self, name: &str, duration: Duration) -> io::Result<()> {
        let millis = duration.as_millis().to_string();
        self.service_message("testFinished", &[("name", name), ("duration", &millis)])
    }

    fn block(&mut self, title: &str, content: &str) -> io::Result<()> {
        self.service_message("blockOpened", &[("name", title)])?;
        self.out.write_all(content.as_bytes())?;
        if !content.is_empty() && !content.ends_with('\n') {
            writeln!(self.out)?;
        }
        self.service_message("blockClosed", &[("name", title)])
    }

    fn message(&mut self, text: &str) -> io::Result<()> {
        self.service_message("message", &[("text", text)])
    }
}

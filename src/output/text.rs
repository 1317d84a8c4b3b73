use std::io::{self, Write};
use std::time::Duration;

use super::Reporter;

/// Human readable protocol
pub struct TextReporter<W: Write> {
    out: W,
    current_failed: bool,
}

impl<W: Write> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            current_failed: false,
        }
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn suite_open(&mut self, name: &str) -> io::Result<()> {
        writeln!(self.out, "=== test set {}", name)
    }

    fn suite_close(&mut self, _name: &str) -> io::Result<()> {
        writeln!(self.out)
    }

    fn test_open(&mut self, name: &str) -> io::Result<()> {
        self.current_failed = false;
        writeln!(self.out, "  --- test {}", name)
    }

    fn test_failed(&mut self, _name: &str, message: &str) -> io::Result<()> {
        self.current_failed = true;
        writeln!(self.out, "    FAILED: {}", message)
    }

    fn test_close(&mut self, _name: &str, duration: Duration) -> io::Result<()> {
        let status = if self.current_failed { "failed" } else { "ok" };
        writeln!(
            self.out,
            "    result: {} ({:.2}s)",
            status,
            duration.as_secs_f64()
        )
    }

    fn block(&mut self, title: &str, content: &str) -> io::Result<()> {
        writeln!(self.out, "    > {}", title)?;
        for line in content.lines() {
            writeln!(self.out, "      {}", line)?;
        }
        Ok(())
    }

    fn message(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "  {}", text)
    }
}

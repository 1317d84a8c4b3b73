use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::builder::TestSetSpec;
use crate::compose::{CommandExecutor, TestOutcome, TestRun};
use crate::output::Reporter;
use crate::telemetry::TelemetryEvent;

/// Collected results of one test set
#[derive(Debug, Clone)]
pub struct TestSetReport {
    pub name: String,
    pub outcomes: Vec<TestOutcome>,
    pub duration: Duration,
    /// Set when the test set itself could not complete
    pub failure: Option<String>,
}

impl TestSetReport {
    /// Report for a test set whose task never delivered results
    pub fn aborted(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcomes: Vec::new(),
            duration: Duration::ZERO,
            failure: Some(message.into()),
        }
    }

    /// A test set succeeds when it completed and every test in it succeeded
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.outcomes.iter().all(TestOutcome::succeeded)
    }

    pub fn failed_tests(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded()).count()
    }

    /// Write the test set's protocol to a reporter
    pub fn dump(&self, reporter: &mut dyn Reporter) -> io::Result<()> {
        reporter.suite_open(&self.name)?;
        if let Some(failure) = &self.failure {
            reporter.message(&format!("test set failed: {}", failure))?;
        }
        for outcome in &self.outcomes {
            reporter.test_open(&outcome.test)?;
            for record in &outcome.records {
                reporter.block(&record.title(), &record.output())?;
            }
            if let Some(failure) = &outcome.failure {
                reporter.test_failed(&outcome.test, failure)?;
            }
            reporter.test_close(&outcome.test, outcome.duration)?;
        }
        reporter.suite_close(&self.name)
    }
}

impl fmt::Display for TestSetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.succeeded() { "ok" } else { "FAILED" };
        write!(
            f,
            "{}: {} ({}/{} tests failed, {:.2}s)",
            self.name,
            status,
            self.failed_tests(),
            self.outcomes.len(),
            self.duration.as_secs_f64()
        )
    }
}

/// A test set ready to run
///
/// Tests of a set run one after another; all of them run even if an
/// earlier one failed.
pub struct TestSet {
    pub name: String,
    pub tests: Vec<TestRun>,
    pub telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl TestSet {
    pub fn new(spec: TestSetSpec, telemetry_tx: mpsc::UnboundedSender<TelemetryEvent>) -> Self {
        let tests = spec
            .tests
            .into_iter()
            .map(|test| TestRun::new(spec.name.clone(), test.name, test.config))
            .collect();
        Self {
            name: spec.name,
            tests,
            telemetry_tx,
        }
    }

    /// Run every test of the set with the given executor
    pub async fn run(self, executor: Arc<dyn CommandExecutor>) -> TestSetReport {
        let start = Instant::now();
        info!("Starting test set {} ({} tests)", self.name, self.tests.len());

        let mut outcomes = Vec::with_capacity(self.tests.len());
        for test in &self.tests {
            let _ = self.telemetry_tx.send(TelemetryEvent::TestStarted {
                testset: self.name.clone(),
                test: test.name.clone(),
            });

            let outcome = test.run(executor.as_ref()).await;

            let _ = self.telemetry_tx.send(TelemetryEvent::TestFinished {
                testset: self.name.clone(),
                test: test.name.clone(),
                succeeded: outcome.succeeded(),
                duration_ms: outcome.duration.as_millis() as u64,
            });
            outcomes.push(outcome);
        }

        let report = TestSetReport {
            name: self.name,
            outcomes,
            duration: start.elapsed(),
            failure: None,
        };
        if report.succeeded() {
            info!("{}", report);
        } else {
            warn!("{}", report);
        }
        report
    }
}

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::builder::TestSetSpec;
use super::testset::{TestSet, TestSetReport};
use crate::compose::CommandExecutor;
use crate::telemetry::{ProgressStats, TelemetryEvent};

/// Result of running all groups
#[derive(Debug)]
pub struct RunOutcome {
    pub succeeded: bool,
    /// Reports of every test set that ran, in group and name order
    pub reports: Vec<TestSetReport>,
    /// Names of the test sets that were skipped because an earlier group failed
    pub skipped: Vec<String>,
    pub duration: Duration,
    pub stats: ProgressStats,
}

/// Runs groups of test sets one after another
///
/// The test sets of a group run concurrently, each in its own task. Once a
/// group contains a failed test set, all following groups are skipped.
pub struct GroupRunner {
    executor: Arc<dyn CommandExecutor>,
    quiet: bool,
}

impl GroupRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>, quiet: bool) -> Self {
        Self { executor, quiet }
    }

    pub async fn run_groups(&self, groups: Vec<Vec<TestSetSpec>>) -> RunOutcome {
        let start_time = Instant::now();
        let total_tests = groups.iter().flatten().map(|set| set.tests.len()).sum();

        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
        let progress = Self::setup_progress_tracking(self.quiet, total_tests, telemetry_rx);

        let mut succeeded = true;
        let mut reports = Vec::new();
        let mut skipped = Vec::new();

        for group in groups {
            if !succeeded {
                for set in group {
                    warn!("skipping {} because of failed dependency", set.name);
                    skipped.push(set.name);
                }
                continue;
            }

            let handles = self.spawn_test_sets(group, &telemetry_tx);
            let names: Vec<String> = handles.iter().map(|(name, _)| name.clone()).collect();
            let results = futures::future::join_all(handles.into_iter().map(|(_, h)| h)).await;

            for (name, result) in names.into_iter().zip(results) {
                let report = match result {
                    Ok(report) => report,
                    Err(e) => {
                        warn!("Test set {} panicked: {:#}", name, e);
                        TestSetReport::aborted(name, e.to_string())
                    }
                };
                if !report.succeeded() {
                    error!("{} failed, skipping following testsets", report.name);
                    succeeded = false;
                }
                reports.push(report);
            }
        }

        // Close the channel so the progress task can finish
        drop(telemetry_tx);
        let stats = match progress.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Progress tracking failed: {:#}", e);
                ProgressStats::new()
            }
        };

        let duration = start_time.elapsed();
        info!(
            "Ran {} test sets ({} skipped) in {:.2}s",
            reports.len(),
            skipped.len(),
            duration.as_secs_f64()
        );

        RunOutcome {
            succeeded,
            reports,
            skipped,
            duration,
            stats,
        }
    }

    /// Spawn one task per test set of a group
    fn spawn_test_sets(
        &self,
        group: Vec<TestSetSpec>,
        telemetry_tx: &mpsc::UnboundedSender<TelemetryEvent>,
    ) -> Vec<(String, JoinHandle<TestSetReport>)> {
        info!("Starting group of {} test sets", group.len());

        group
            .into_iter()
            .map(|spec| {
                let name = spec.name.clone();
                let set = TestSet::new(spec, telemetry_tx.clone());
                let executor = Arc::clone(&self.executor);
                let handle = tokio::spawn(async move { set.run(executor).await });
                (name, handle)
            })
            .collect()
    }

    /// Track progress of all tests, drawing a progress bar unless quiet
    fn setup_progress_tracking(
        quiet: bool,
        total_tests: usize,
        mut telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
    ) -> JoinHandle<ProgressStats> {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(total_tests as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] Tests: [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("=>-"));
            }
            bar
        };

        tokio::spawn(async move {
            let mut stats = ProgressStats::new();

            while let Some(event) = telemetry_rx.recv().await {
                stats.update(&event);

                bar.set_position(stats.tests_finished as u64);
                if let TelemetryEvent::TestStarted { testset, test } = &event {
                    bar.set_message(format!("{}/{}", testset, test));
                }
            }

            bar.finish_with_message(format!(
                "{} finished, {} failed",
                stats.tests_finished, stats.tests_failed
            ));
            stats
        })
    }
}

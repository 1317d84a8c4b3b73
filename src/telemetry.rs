/// Telemetry events sent from test sets to the group runner for progress tracking
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A test set began executing a test
    TestStarted { testset: String, test: String },
    /// A test finished, successfully or not
    TestFinished {
        testset: String,
        test: String,
        succeeded: bool,
        duration_ms: u64,
    },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub tests_started: usize,
    pub tests_finished: usize,
    pub tests_failed: usize,
    pub test_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::TestStarted { .. } => {
                self.tests_started += 1;
            }
            TelemetryEvent::TestFinished {
                succeeded,
                duration_ms,
                ..
            } => {
                self.tests_finished += 1;
                if !succeeded {
                    self.tests_failed += 1;
                }
                self.test_durations_ms.push(*duration_ms);
            }
        }
    }

    /// Tests that have started but not finished yet
    pub fn running(&self) -> usize {
        self.tests_started.saturating_sub(self.tests_finished)
    }

    /// Calculate percentile from test durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.test_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.test_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
        let index = index.saturating_sub(1).min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}

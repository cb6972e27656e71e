//! The scheduled-time spinner.
//!
//! One spinner is shared by all handler workers. For each operation it
//! first sleeps until the scheduled start time is close enough (within the
//! early-start tolerance), then polls the operation's gate checks until
//! they all pass. Both phases poll at a configurable granularity and bail
//! out promptly when the run's shutdown flag goes up, so a draining run
//! never sits out a distant scheduled time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::reporter::ErrorReporter;
use crate::sched::check::{CheckOutcome, SpinnerCheck};
use crate::time::TimeSource;
use crate::workload::Operation;

/// Default polling interval between gate checks and time checks.
pub const DEFAULT_GRANULARITY: Duration = Duration::from_millis(1);

const REPORT_SOURCE: &str = "spinner";

/// Why the spinner returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinnerOutcome {
    /// Scheduled time reached and every gate open.
    ReadyToExecute,
    /// A gate reported it can never open; already reported.
    CheckFailed,
    /// The run's shutdown flag went up while waiting.
    ShutDown,
}

/// Polls operations toward execution readiness.
pub struct Spinner {
    time_source: Arc<dyn TimeSource>,
    shutdown: Arc<AtomicBool>,
    reporter: Arc<ErrorReporter>,
    granularity: Duration,
    early_start_tolerance: Duration,
}

impl Spinner {
    /// Creates a spinner with the default granularity and zero early-start
    /// tolerance.
    #[must_use]
    pub fn new(
        time_source: Arc<dyn TimeSource>,
        shutdown: Arc<AtomicBool>,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self {
            time_source,
            shutdown,
            reporter,
            granularity: DEFAULT_GRANULARITY,
            early_start_tolerance: Duration::ZERO,
        }
    }

    /// Sets the polling interval.
    #[must_use]
    pub fn with_granularity(mut self, granularity: Duration) -> Self {
        self.granularity = granularity;
        self
    }

    /// Allows execution to begin this far ahead of the scheduled start.
    #[must_use]
    pub fn with_early_start_tolerance(mut self, tolerance: Duration) -> Self {
        self.early_start_tolerance = tolerance;
        self
    }

    /// Blocks until `operation`'s scheduled start (minus the early-start
    /// tolerance) is reached. Returns [`SpinnerOutcome::ShutDown`] if the
    /// run ends first, [`SpinnerOutcome::ReadyToExecute`] otherwise.
    pub fn wait_until_due(&self, operation: &Operation) -> SpinnerOutcome {
        let release = operation
            .scheduled_start()
            .saturating_sub(self.early_start_tolerance);
        while self.time_source.now() < release {
            if self.shutdown.load(Ordering::Acquire) {
                return SpinnerOutcome::ShutDown;
            }
            std::thread::sleep(self.granularity);
        }
        SpinnerOutcome::ReadyToExecute
    }

    /// Polls `checks` until all pass, one fails, or shutdown.
    pub fn wait_for_checks(&self, checks: &[Box<dyn SpinnerCheck>]) -> SpinnerOutcome {
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return SpinnerOutcome::ShutDown;
            }
            let mut all_passed = true;
            for check in checks {
                match check.check() {
                    CheckOutcome::Passed => {}
                    CheckOutcome::StillWaiting => all_passed = false,
                    CheckOutcome::Failed => {
                        self.reporter
                            .report(REPORT_SOURCE, format!("gate failed: {}", check.describe()));
                        return SpinnerOutcome::CheckFailed;
                    }
                }
            }
            if all_passed {
                return SpinnerOutcome::ReadyToExecute;
            }
            std::thread::sleep(self.granularity);
        }
    }

    /// Blocks until `operation` may execute, a gate fails, or shutdown.
    pub fn wait_for(
        &self,
        operation: &Operation,
        checks: &[Box<dyn SpinnerCheck>],
    ) -> SpinnerOutcome {
        match self.wait_until_due(operation) {
            SpinnerOutcome::ReadyToExecute => self.wait_for_checks(checks),
            interrupted => interrupted,
        }
    }
}

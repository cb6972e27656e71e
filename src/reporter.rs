//! Process-wide error aggregation.
//!
//! Every component that can fail concurrently (service, scheduler, handlers,
//! pool workers) shares one [`ErrorReporter`] by `Arc`, injected at
//! construction. Reporting never blocks the reporting thread behind anything
//! slower than a short mutex, and never panics. The first report wins the
//! detailed record; later reports still flip nothing but the total count, so
//! the run's postmortem always shows the error that started the failure.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A single recorded error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    /// Component that reported, e.g. `"completion-time-service"`.
    pub source: String,
    /// Human-readable description.
    pub message: String,
    /// Name of the reporting thread, when it has one.
    pub thread: Option<String>,
}

impl std::fmt::Display for ReportedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.thread {
            Some(thread) => write!(f, "[{}] {} (thread {})", self.source, self.message, thread),
            None => write!(f, "[{}] {}", self.source, self.message),
        }
    }
}

/// Thread-safe first-error-wins sink.
///
/// `error_encountered()` is a plain atomic load, cheap enough for hot-path
/// polling by the run loop.
#[derive(Debug, Default)]
pub struct ErrorReporter {
    tripped: AtomicBool,
    total: AtomicU64,
    first: Mutex<Option<ReportedError>>,
}

impl ErrorReporter {
    /// Creates an empty reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error. The first report is kept in full; every report
    /// increments the total and is logged.
    pub fn report(&self, source: impl Into<String>, message: impl Into<String>) {
        let entry = ReportedError {
            source: source.into(),
            message: message.into(),
            thread: std::thread::current().name().map(str::to_owned),
        };
        tracing::error!(source = %entry.source, message = %entry.message, "error reported");

        {
            // Fill the record before flipping the flag so a reader that
            // observes the flag always finds the first error present.
            let mut first = self.first.lock();
            if first.is_none() {
                *first = Some(entry);
            }
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        self.tripped.store(true, Ordering::Release);
    }

    /// Returns true once any error has been reported.
    #[must_use]
    pub fn error_encountered(&self) -> bool {
        self.tripped.load(Ordering::Acquire)
    }

    /// The first reported error, if any.
    #[must_use]
    pub fn first_error(&self) -> Option<ReportedError> {
        self.first.lock().clone()
    }

    /// Total number of reports so far.
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.first_error() {
            Some(first) => write!(f, "{} error(s), first: {}", self.error_count(), first),
            None => write!(f, "no errors reported"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_clean() {
        let reporter = ErrorReporter::new();
        assert!(!reporter.error_encountered());
        assert_eq!(reporter.error_count(), 0);
        assert_eq!(reporter.first_error(), None);
        assert_eq!(reporter.to_string(), "no errors reported");
    }

    #[test]
    fn first_report_wins() {
        let reporter = ErrorReporter::new();
        reporter.report("scheduler", "late dispatch");
        reporter.report("service", "rejected submission");

        assert!(reporter.error_encountered());
        assert_eq!(reporter.error_count(), 2);
        let first = reporter.first_error().unwrap();
        assert_eq!(first.source, "scheduler");
        assert_eq!(first.message, "late dispatch");
    }

    #[test]
    fn concurrent_reports_keep_exactly_one_first() {
        let reporter = Arc::new(ErrorReporter::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let reporter = Arc::clone(&reporter);
            handles.push(std::thread::spawn(move || {
                for j in 0..100 {
                    reporter.report("worker", format!("error {i}-{j}"));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(reporter.error_count(), 800);
        // Whichever report won, there is exactly one coherent record.
        let first = reporter.first_error().unwrap();
        assert_eq!(first.source, "worker");
        assert!(first.message.starts_with("error "));
    }

    #[test]
    fn records_thread_name_when_present() {
        let reporter = Arc::new(ErrorReporter::new());
        let inner = Arc::clone(&reporter);
        std::thread::Builder::new()
            .name("submit-worker".to_owned())
            .spawn(move || inner.report("test", "boom"))
            .unwrap()
            .join()
            .unwrap();

        let first = reporter.first_error().unwrap();
        assert_eq!(first.thread.as_deref(), Some("submit-worker"));
        assert!(first.to_string().contains("submit-worker"));
    }
}

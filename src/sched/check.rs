//! Pre-execution gate checks.
//!
//! A handler may carry any number of [`SpinnerCheck`]s; the spinner polls
//! them after the scheduled start time is reached, and execution begins
//! only once every check has passed. Checks are read-only: they observe
//! shared state (typically the completion-time watermark) and never
//! mutate it.

use std::sync::Arc;

use crate::coord::GlobalCompletionTimeReader;
use crate::time::Time;
use crate::workload::{Operation, OperationType};

/// One polling result from a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The gate is open; stop polling this check.
    Passed,
    /// Not yet; poll again after the spinner's granularity.
    StillWaiting,
    /// The gate can never open. The handler gives up on the operation.
    Failed,
}

/// A gate the spinner polls before execution.
pub trait SpinnerCheck: Send + Sync {
    /// Polls the gate.
    fn check(&self) -> CheckOutcome;

    /// Names the gate for rejection reports.
    fn describe(&self) -> String;
}

/// Gate that opens once the global completion time reaches the operation's
/// dependency time.
///
/// The bound is inclusive: a watermark equal to the dependency time means
/// everything scheduled before it has completed, so the dependent operation
/// may run. An undefined watermark never passes.
pub struct DependencyTimeCheck {
    op_type: OperationType,
    dependency_time: Time,
    reader: Arc<dyn GlobalCompletionTimeReader>,
}

impl DependencyTimeCheck {
    /// Creates the gate for one operation.
    #[must_use]
    pub fn new(operation: &Operation, reader: Arc<dyn GlobalCompletionTimeReader>) -> Self {
        Self {
            op_type: operation.op_type(),
            dependency_time: operation.dependency_time(),
            reader,
        }
    }
}

impl SpinnerCheck for DependencyTimeCheck {
    fn check(&self) -> CheckOutcome {
        match self.reader.global_completion_time() {
            Some(gct) if gct >= self.dependency_time => CheckOutcome::Passed,
            _ => CheckOutcome::StillWaiting,
        }
    }

    fn describe(&self) -> String {
        format!(
            "global completion time below dependency time {} of operation type {}",
            self.dependency_time, self.op_type
        )
    }
}

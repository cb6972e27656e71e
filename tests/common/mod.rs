//! Shared helpers for the integration suite.

#![allow(dead_code)]

use std::sync::Arc;

use tideline::{
    BoxedExecutor, ClassificationTable, DependencyMode, ExecutionAdapter, ExecutionError,
    Operation, OperationClassification, OperationType, SchedulingMode, Time,
};

/// Operation type with no dependency tracking.
pub const UNTRACKED: u32 = 1;
/// Operation type that both reads and writes the watermark.
pub const TRACKED: u32 = 2;

/// Installs the tracing subscriber once per test binary.
pub fn init_test_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Classification table covering [`UNTRACKED`] and [`TRACKED`].
pub fn classification_table() -> ClassificationTable {
    ClassificationTable::from_entries([
        (
            OperationType::new(UNTRACKED),
            OperationClassification::new(DependencyMode::None, SchedulingMode::IndividualAsync),
        ),
        (
            OperationType::new(TRACKED),
            OperationClassification::new(
                DependencyMode::ReadWrite,
                SchedulingMode::IndividualAsync,
            ),
        ),
    ])
}

/// Builds an operation with nanosecond times.
pub fn op(op_type: u32, scheduled_nanos: u64, dependency_nanos: u64) -> Operation {
    Operation::new(
        OperationType::new(op_type),
        Time::from_nanos(scheduled_nanos),
        Time::from_nanos(dependency_nanos),
    )
}

/// Adapter that runs the same closure for every operation.
pub struct ClosureAdapter<F>(pub F);

impl<F> ExecutionAdapter for ClosureAdapter<F>
where
    F: Fn(&Operation) -> Result<(), ExecutionError> + Clone + Send + Sync + 'static,
{
    fn executor_for(&self, _operation: &Operation) -> Result<BoxedExecutor, ExecutionError> {
        let run = self.0.clone();
        Ok(Box::new(move |operation| run(operation)))
    }
}

/// Adapter whose executors succeed without doing anything.
pub fn noop_adapter() -> Arc<dyn ExecutionAdapter> {
    Arc::new(ClosureAdapter(|_: &Operation| Ok(())))
}

//! Two-pass wiring of operation batches.
//!
//! The dispatcher turns a batch of classified operations into runnable
//! [`OperationHandler`]s. Writer lanes come first: one pass over the batch
//! creates a completion-time writer for every scheduling mode that appears
//! among dependency-tracked operations, so every writer exists before any
//! handler of the batch can start. The second pass wires each operation to
//! its lane's writer (untracked operations share a no-op stub), attaches
//! the dependency gate to tracked ones, and fetches an executor from the
//! adapter.
//!
//! Lanes persist across batches: all batches of a run feed the same local
//! record through at most one writer per scheduling mode. A workload with
//! no tracked operations therefore creates no writers and attaches no
//! gates, and its operations never touch the coordination service.

use std::sync::Arc;

use crate::coord::{
    CompletionTimeService, GlobalCompletionTimeReader, LocalCompletionTimeWriter, NoopLocalWriter,
    ServiceHandles,
};
use crate::error::DriverError;
use crate::exec::handler::OperationHandler;
use crate::exec::ExecutionAdapter;
use crate::metrics::MetricsSink;
use crate::reporter::ErrorReporter;
use crate::sched::DependencyTimeCheck;
use crate::time::TimeSource;
use crate::workload::{ClassificationTable, Operation, SchedulingMode};

/// Wires operations to handlers, one batch at a time.
pub struct OperationDispatcher {
    classifications: ClassificationTable,
    service: Arc<dyn CompletionTimeService>,
    reader: Arc<dyn GlobalCompletionTimeReader>,
    adapter: Arc<dyn ExecutionAdapter>,
    time_source: Arc<dyn TimeSource>,
    metrics: Arc<dyn MetricsSink>,
    reporter: Arc<ErrorReporter>,
    lane_writers: [Option<Arc<dyn LocalCompletionTimeWriter>>; SchedulingMode::COUNT],
    noop_writer: Arc<dyn LocalCompletionTimeWriter>,
}

impl OperationDispatcher {
    /// Creates a dispatcher bound to one service instance.
    #[must_use]
    pub fn new(
        classifications: ClassificationTable,
        handles: &ServiceHandles,
        adapter: Arc<dyn ExecutionAdapter>,
        time_source: Arc<dyn TimeSource>,
        metrics: Arc<dyn MetricsSink>,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self {
            classifications,
            service: Arc::clone(&handles.service),
            reader: Arc::clone(&handles.reader),
            adapter,
            time_source,
            metrics,
            reporter,
            lane_writers: Default::default(),
            noop_writer: Arc::new(NoopLocalWriter),
        }
    }

    /// Number of writer lanes created so far.
    #[must_use]
    pub fn writers_created(&self) -> usize {
        self.lane_writers.iter().flatten().count()
    }

    /// Wires one batch into handlers, in batch order.
    ///
    /// # Errors
    ///
    /// Fails on the first unclassified operation type, adapter refusal, or
    /// coordination-service error; no handlers are returned in that case.
    pub fn wire_batch(
        &mut self,
        batch: Vec<Operation>,
    ) -> Result<Vec<OperationHandler>, DriverError> {
        // Writer lanes exist before any handler is wired.
        for operation in &batch {
            let class = self.classifications.require(operation.op_type())?;
            if class.dependency.is_dependency_tracked() {
                self.lane_writer(class.scheduling)?;
                if self.lane_writers.iter().all(Option::is_some) {
                    break;
                }
            }
        }

        let mut handlers = Vec::with_capacity(batch.len());
        for operation in batch {
            let class = self.classifications.require(operation.op_type())?;
            let tracked = class.dependency.is_dependency_tracked();
            let writer = if tracked {
                self.lane_writer(class.scheduling)?
            } else {
                Arc::clone(&self.noop_writer)
            };
            let gate =
                tracked.then(|| DependencyTimeCheck::new(&operation, Arc::clone(&self.reader)));
            let executor = self.adapter.executor_for(&operation)?;

            let mut handler = OperationHandler::new(
                operation,
                writer,
                executor,
                Arc::clone(&self.time_source),
                Arc::clone(&self.metrics),
                Arc::clone(&self.reporter),
            );
            if let Some(gate) = gate {
                handler.add_check(Box::new(gate));
            }
            handlers.push(handler);
        }
        Ok(handlers)
    }

    fn lane_writer(
        &mut self,
        mode: SchedulingMode,
    ) -> Result<Arc<dyn LocalCompletionTimeWriter>, DriverError> {
        let lane = mode.lane_index();
        if let Some(writer) = &self.lane_writers[lane] {
            return Ok(Arc::clone(writer));
        }
        let writer = self.service.new_local_writer()?;
        tracing::debug!(lane = %mode, writer = %writer.id(), "dispatch lane writer created");
        self.lane_writers[lane] = Some(Arc::clone(&writer));
        Ok(writer)
    }
}

//! The top-level run driver.
//!
//! [`Driver`] owns one run end to end: it starts the completion-time
//! service for the configured strategy, seeds the watermark when asked,
//! wires the operation stream into handlers batch by batch, feeds them to
//! the worker pool, and waits for the pool to drain. The outcome is a
//! [`RunReport`].
//!
//! Failures split the way the rest of the crate splits them: rejected
//! submissions, failed gates, and failed executions are reported and the
//! run keeps going, with the verdict carried in the report. Wiring
//! failures (an unclassified operation type, an adapter refusal, a dead
//! pool) abort the run: the driver raises the shutdown signal so waiting
//! handlers abandon, drains the pool, shuts the service down, and returns
//! the error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::DriverConfig;
use crate::coord::{
    new_completion_time_service, CompletionTimeService, CompletionTimeStrategy, ServiceHandles,
};
use crate::error::{CoordinationError, DriverError};
use crate::exec::{ExecutionAdapter, HandlerPool, OperationDispatcher};
use crate::metrics::{MetricsSink, NullMetrics};
use crate::reporter::{ErrorReporter, ReportedError};
use crate::sched::Spinner;
use crate::time::{Time, TimeSource, WallClock};
use crate::workload::{ClassificationTable, Operation};

const REPORT_SOURCE: &str = "driver";

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Summary of one finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Strategy that computed the watermark.
    pub strategy: CompletionTimeStrategy,
    /// Operations handed to the pool.
    pub operations_submitted: u64,
    /// Operations that executed and succeeded.
    pub executed: u64,
    /// Operations that executed and failed in the system under test.
    pub failed: u64,
    /// Operations abandoned before execution.
    pub not_executed: u64,
    /// The watermark after the service processed every submission of the
    /// run. `None` when nothing ever defined it.
    pub final_global_completion_time: Option<Time>,
    /// True when anything was reported during the run.
    pub error_encountered: bool,
    /// Number of reports.
    pub error_count: u64,
    /// The report that started the failure, when there was one.
    pub first_error: Option<ReportedError>,
}

impl RunReport {
    /// True when the run finished without a single reported error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.error_encountered
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Drives one workload from operation stream to [`RunReport`].
pub struct Driver {
    config: DriverConfig,
    classifications: ClassificationTable,
    adapter: Arc<dyn ExecutionAdapter>,
    metrics: Arc<dyn MetricsSink>,
    time_source: Arc<dyn TimeSource>,
    reporter: Arc<ErrorReporter>,
    handles: ServiceHandles,
    shutdown: Arc<AtomicBool>,
}

impl Driver {
    /// Builds a driver: validates the configuration and starts the
    /// completion-time service for the configured strategy.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] for an invalid configuration, or
    /// the coordination error when the queued strategy's background
    /// thread cannot start.
    pub fn new(
        config: DriverConfig,
        classifications: ClassificationTable,
        adapter: Arc<dyn ExecutionAdapter>,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let reporter = Arc::new(ErrorReporter::new());
        let handles = new_completion_time_service(
            config.strategy,
            config.local_peer.clone(),
            &config.peers,
            Arc::clone(&reporter),
        )?;
        Ok(Self {
            config,
            classifications,
            adapter,
            metrics: Arc::new(NullMetrics),
            time_source: Arc::new(WallClock::new()),
            reporter,
            handles,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replaces the metrics sink. The default discards records.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces the time source. The default is the wall clock.
    #[must_use]
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Handle to the completion-time service, for feeding remote peers'
    /// completed times into the run from another thread.
    #[must_use]
    pub fn completion_time_service(&self) -> Arc<dyn CompletionTimeService> {
        Arc::clone(&self.handles.service)
    }

    /// The shutdown signal shared with the scheduler. Raising it abandons
    /// every operation still waiting for its scheduled time or its gates;
    /// those finish as not executed. Operations already executing run to
    /// completion.
    #[must_use]
    pub fn shutdown_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Runs the workload to completion and reports.
    ///
    /// Blocks until every submitted operation has finished or been
    /// abandoned. A remote peer that never reports stalls every gated
    /// operation, and with them this call; that is the coordination
    /// model's fail-stop behavior, and
    /// [`shutdown_signal`](Self::shutdown_signal) is the way to break it
    /// from outside.
    ///
    /// # Errors
    ///
    /// Returns the first wiring failure: an unclassified operation type,
    /// an adapter with no executor for an operation, or a coordination
    /// service or pool that went away. The pool is drained and the
    /// service shut down before the error is returned. Errors reported
    /// mid-run do not end up here; they are in the report.
    pub fn run(
        self,
        operations: impl IntoIterator<Item = Operation>,
    ) -> Result<RunReport, DriverError> {
        let strategy = self.config.strategy;
        tracing::info!(
            %strategy,
            workers = self.config.worker_threads,
            peers = self.config.peers.len(),
            "run starting"
        );

        let spinner = Arc::new(
            Spinner::new(
                Arc::clone(&self.time_source),
                Arc::clone(&self.shutdown),
                Arc::clone(&self.reporter),
            )
            .with_granularity(self.config.spinner_granularity)
            .with_early_start_tolerance(self.config.early_start_tolerance),
        );
        let pool = match HandlerPool::spawn(
            self.config.worker_threads,
            spinner,
            Arc::clone(&self.reporter),
        ) {
            Ok(pool) => pool,
            Err(error) => {
                self.shutdown_service();
                return Err(error);
            }
        };

        let outcome = self.dispatch_all(&pool, operations.into_iter());
        if let Err(error) = &outcome {
            self.reporter
                .report(REPORT_SOURCE, format!("run aborted: {error}"));
            self.shutdown.store(true, Ordering::Release);
        }

        let pool_stats = pool.join();
        // Shutdown drains the queued strategy's backlog, so the watermark
        // read below covers every submission the run made.
        self.shutdown_service();
        let final_global_completion_time = self.handles.reader.global_completion_time();
        let operations_submitted = outcome?;

        let report = RunReport {
            strategy,
            operations_submitted,
            executed: pool_stats.executed,
            failed: pool_stats.failed,
            not_executed: pool_stats.not_executed,
            final_global_completion_time,
            error_encountered: self.reporter.error_encountered(),
            error_count: self.reporter.error_count(),
            first_error: self.reporter.first_error(),
        };
        tracing::info!(
            executed = report.executed,
            failed = report.failed,
            not_executed = report.not_executed,
            global_completion_time = ?report.final_global_completion_time,
            success = report.is_success(),
            "run finished"
        );
        Ok(report)
    }

    /// Seeds the watermark when configured, then wires and submits every
    /// operation. Returns how many reached the pool.
    fn dispatch_all(
        &self,
        pool: &HandlerPool,
        mut operations: impl Iterator<Item = Operation>,
    ) -> Result<u64, DriverError> {
        if let Some(time) = self.config.initial_completion_time {
            self.seed_watermark(time)?;
        }

        let mut dispatcher = OperationDispatcher::new(
            self.classifications.clone(),
            &self.handles,
            Arc::clone(&self.adapter),
            Arc::clone(&self.time_source),
            Arc::clone(&self.metrics),
            Arc::clone(&self.reporter),
        );

        let mut submitted = 0_u64;
        loop {
            let batch: Vec<Operation> = operations
                .by_ref()
                .take(self.config.dispatch_batch)
                .collect();
            if batch.is_empty() {
                break Ok(submitted);
            }
            for handler in dispatcher.wire_batch(batch)? {
                pool.submit(handler)?;
                submitted += 1;
            }
        }
    }

    fn seed_watermark(&self, time: Time) -> Result<(), CoordinationError> {
        let writer = self.handles.service.new_local_writer()?;
        writer.submit_initiated(time)?;
        writer.submit_completed(time)?;
        tracing::debug!(%time, writer = %writer.id(), "watermark seeded");
        Ok(())
    }

    fn shutdown_service(&self) {
        if let Err(error) = self.handles.service.shutdown() {
            tracing::warn!(%error, "completion-time service shutdown failed");
        }
    }
}

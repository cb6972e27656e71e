//! The per-operation execution state machine.
//!
//! Each operation the dispatcher wires becomes one [`OperationHandler`].
//! A pool worker drives it through its phases: wait for the scheduled
//! time, poll the gate checks, execute, then report progress to the
//! completion-time writer and the metrics sink. The handler owns its
//! operation; `run` consumes it and returns a [`HandlerOutcome`].
//!
//! Progress is submitted even when the system under test rejects the
//! operation: the watermark tracks *dispatched* work, and holding it back
//! for a failed operation would stall every dependent operation behind a
//! failure the run is defined to survive. The failure itself is reported
//! and counted, and the run continues. An operation that never executed
//! (failed gate, shutdown) submits nothing.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::coord::{LocalCompletionTimeWriter, WriterId};
use crate::error::ExecutionError;
use crate::metrics::{MetricsSink, OperationOutcome, OperationRecord};
use crate::reporter::ErrorReporter;
use crate::sched::{Spinner, SpinnerCheck, SpinnerOutcome};
use crate::time::TimeSource;
use crate::workload::Operation;

const REPORT_SOURCE: &str = "operation-handler";

/// Executes one operation against the system under test.
pub type BoxedExecutor = Box<dyn FnOnce(&Operation) -> Result<(), ExecutionError> + Send>;

/// What running a handler produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Executed and succeeded.
    Executed,
    /// Executed; the system under test returned an error.
    ExecutionFailed,
    /// Never executed: a gate failed or the run shut down first.
    NotExecuted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandlerPhase {
    WaitingForScheduledTime,
    Checking,
    Executing,
    Done,
    Failed,
}

/// One wired operation, ready to be driven by a pool worker.
pub struct OperationHandler {
    operation: Operation,
    writer: Arc<dyn LocalCompletionTimeWriter>,
    checks: SmallVec<[Box<dyn SpinnerCheck>; 2]>,
    executor: BoxedExecutor,
    time_source: Arc<dyn TimeSource>,
    metrics: Arc<dyn MetricsSink>,
    reporter: Arc<ErrorReporter>,
    phase: HandlerPhase,
}

impl std::fmt::Debug for OperationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandler")
            .field("operation", &self.operation)
            .field("writer_id", &self.writer.id())
            .field("gate_count", &self.checks.len())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl OperationHandler {
    /// Wires a handler: the operation, its completion-time writer, and the
    /// executor the adapter produced for it. Gates are attached afterwards
    /// with [`add_check`](Self::add_check).
    #[must_use]
    pub fn new(
        operation: Operation,
        writer: Arc<dyn LocalCompletionTimeWriter>,
        executor: BoxedExecutor,
        time_source: Arc<dyn TimeSource>,
        metrics: Arc<dyn MetricsSink>,
        reporter: Arc<ErrorReporter>,
    ) -> Self {
        Self {
            operation,
            writer,
            checks: SmallVec::new(),
            executor,
            time_source,
            metrics,
            reporter,
            phase: HandlerPhase::WaitingForScheduledTime,
        }
    }

    /// Attaches a gate the spinner must see pass before execution.
    pub fn add_check(&mut self, check: Box<dyn SpinnerCheck>) {
        self.checks.push(check);
    }

    /// The wired operation.
    #[must_use]
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Lane id of the assigned completion-time writer.
    #[must_use]
    pub fn writer_id(&self) -> WriterId {
        self.writer.id()
    }

    /// Number of attached gates.
    #[must_use]
    pub fn gate_count(&self) -> usize {
        self.checks.len()
    }

    fn transition(&mut self, phase: HandlerPhase) {
        self.phase = phase;
        tracing::trace!(
            op_type = %self.operation.op_type(),
            phase = ?self.phase,
            "handler phase"
        );
    }

    /// Drives the operation to completion.
    pub fn run(mut self, spinner: &Spinner) -> HandlerOutcome {
        if spinner.wait_until_due(&self.operation) == SpinnerOutcome::ShutDown {
            return self.abandon("shut down before scheduled time");
        }

        self.transition(HandlerPhase::Checking);
        match spinner.wait_for_checks(&self.checks) {
            SpinnerOutcome::ReadyToExecute => {}
            SpinnerOutcome::CheckFailed => return self.abandon("gate failed"),
            SpinnerOutcome::ShutDown => return self.abandon("shut down while gated"),
        }

        self.transition(HandlerPhase::Executing);
        let started = self.time_source.now();
        let executor = self.executor;
        let result = executor(&self.operation);
        let finished = self.time_source.now();
        if let Err(err) = &result {
            self.reporter.report(
                REPORT_SOURCE,
                format!("operation type {} failed: {err}", self.operation.op_type()),
            );
        }

        // `self.executor` was moved out above, so `transition` cannot be
        // called on the partially moved `self`; update the fields directly.
        self.phase = HandlerPhase::Done;
        tracing::trace!(
            op_type = %self.operation.op_type(),
            phase = ?self.phase,
            "handler phase"
        );
        // Initiated before completed; the state table rejects the reverse.
        let timestamp = self.operation.scheduled_start();
        let submitted = self
            .writer
            .submit_initiated(timestamp)
            .and_then(|()| self.writer.submit_completed(timestamp));
        if let Err(err) = submitted {
            // Real violations were already reported by the service; this
            // log covers shutdown races.
            tracing::warn!(
                op_type = %self.operation.op_type(),
                writer = %self.writer.id(),
                error = %err,
                "progress submission rejected"
            );
        }

        let outcome = match &result {
            Ok(()) => OperationOutcome::Succeeded,
            Err(_) => OperationOutcome::Failed,
        };
        self.metrics.record(OperationRecord {
            op_type: self.operation.op_type(),
            scheduled_start: timestamp,
            actual_start: Some(started),
            finished: Some(finished),
            outcome,
        });
        match result {
            Ok(()) => HandlerOutcome::Executed,
            Err(_) => HandlerOutcome::ExecutionFailed,
        }
    }

    fn abandon(mut self, reason: &'static str) -> HandlerOutcome {
        self.transition(HandlerPhase::Failed);
        tracing::debug!(
            op_type = %self.operation.op_type(),
            reason,
            "operation not executed"
        );
        self.metrics.record(OperationRecord {
            op_type: self.operation.op_type(),
            scheduled_start: self.operation.scheduled_start(),
            actual_start: None,
            finished: None,
            outcome: OperationOutcome::NotExecuted,
        });
        HandlerOutcome::NotExecuted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{
        CompletionTimeService, GlobalCompletionTimeReader, PeerId,
        SynchronizedCompletionTimeService,
    };
    use crate::error::CoordinationError;
    use crate::metrics::InMemoryMetrics;
    use crate::sched::{CheckOutcome, DependencyTimeCheck};
    use crate::time::{Time, VirtualClock};
    use crate::workload::OperationType;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordingWriter {
        calls: Mutex<Vec<(&'static str, Time)>>,
    }

    impl LocalCompletionTimeWriter for RecordingWriter {
        fn id(&self) -> WriterId {
            WriterId::new(0)
        }

        fn submit_initiated(&self, time: Time) -> Result<(), CoordinationError> {
            self.calls.lock().push(("initiated", time));
            Ok(())
        }

        fn submit_completed(&self, time: Time) -> Result<(), CoordinationError> {
            self.calls.lock().push(("completed", time));
            Ok(())
        }
    }

    struct Fixture {
        clock: Arc<VirtualClock>,
        shutdown: Arc<AtomicBool>,
        reporter: Arc<ErrorReporter>,
        spinner: Spinner,
        writer: Arc<RecordingWriter>,
        metrics: Arc<InMemoryMetrics>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(VirtualClock::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let reporter = Arc::new(ErrorReporter::new());
        let spinner = Spinner::new(
            Arc::clone(&clock) as Arc<dyn TimeSource>,
            Arc::clone(&shutdown),
            Arc::clone(&reporter),
        )
        .with_granularity(Duration::from_micros(100));
        Fixture {
            clock,
            shutdown,
            reporter,
            spinner,
            writer: Arc::new(RecordingWriter::default()),
            metrics: Arc::new(InMemoryMetrics::new()),
        }
    }

    fn handler_for(fx: &Fixture, operation: Operation, executor: BoxedExecutor) -> OperationHandler {
        OperationHandler::new(
            operation,
            Arc::clone(&fx.writer) as Arc<dyn LocalCompletionTimeWriter>,
            executor,
            Arc::clone(&fx.clock) as Arc<dyn TimeSource>,
            Arc::clone(&fx.metrics) as Arc<dyn MetricsSink>,
            Arc::clone(&fx.reporter),
        )
    }

    fn op(scheduled_nanos: u64) -> Operation {
        Operation::new(
            OperationType::new(1),
            Time::from_nanos(scheduled_nanos),
            Time::ZERO,
        )
    }

    #[test]
    fn executes_and_submits_initiated_then_completed() {
        let fx = fixture();
        fx.clock.set(Time::from_nanos(200));
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let handler = handler_for(&fx, op(100), Box::new(move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }));

        assert_eq!(handler.run(&fx.spinner), HandlerOutcome::Executed);
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(
            *fx.writer.calls.lock(),
            vec![
                ("initiated", Time::from_nanos(100)),
                ("completed", Time::from_nanos(100)),
            ]
        );
        assert_eq!(fx.metrics.snapshot().succeeded, 1);
        assert!(!fx.reporter.error_encountered());
    }

    #[test]
    fn failed_execution_reports_and_still_submits_progress() {
        let fx = fixture();
        fx.clock.set(Time::from_nanos(200));
        let handler = handler_for(&fx, op(100), Box::new(|_| {
            Err(ExecutionError::Failed {
                message: "deadlock victim".to_owned(),
            })
        }));

        assert_eq!(handler.run(&fx.spinner), HandlerOutcome::ExecutionFailed);
        assert_eq!(fx.writer.calls.lock().len(), 2);
        let snap = fx.metrics.snapshot();
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.succeeded, 0);
        assert!(fx.reporter.error_encountered());
        let first = fx.reporter.first_error().unwrap();
        assert_eq!(first.source, "operation-handler");
        assert!(first.message.contains("deadlock victim"));
    }

    #[test]
    fn shutdown_abandons_without_submitting() {
        let fx = fixture();
        fx.shutdown.store(true, Ordering::SeqCst);
        let handler = handler_for(&fx, op(u64::MAX), Box::new(|_| Ok(())));

        assert_eq!(handler.run(&fx.spinner), HandlerOutcome::NotExecuted);
        assert!(fx.writer.calls.lock().is_empty());
        assert_eq!(fx.metrics.snapshot().not_executed, 1);
    }

    #[test]
    fn failed_gate_abandons_and_reports() {
        struct DeadGate;
        impl SpinnerCheck for DeadGate {
            fn check(&self) -> CheckOutcome {
                CheckOutcome::Failed
            }
            fn describe(&self) -> String {
                "dead gate".to_owned()
            }
        }

        let fx = fixture();
        fx.clock.set(Time::from_nanos(200));
        let mut handler = handler_for(&fx, op(100), Box::new(|_| Ok(())));
        handler.add_check(Box::new(DeadGate));

        assert_eq!(handler.run(&fx.spinner), HandlerOutcome::NotExecuted);
        assert!(fx.writer.calls.lock().is_empty());
        assert!(fx.reporter.error_encountered());
        assert_eq!(fx.metrics.snapshot().not_executed, 1);
    }

    #[test]
    fn dependency_gate_holds_until_watermark_reaches_it() {
        let fx = fixture();
        fx.clock.set(Time::from_nanos(1_000));

        let service = Arc::new(SynchronizedCompletionTimeService::new(
            PeerId::new("local"),
            &[],
            Arc::clone(&fx.reporter),
        ));
        let lane = service.new_local_writer().unwrap();

        // Dependent on everything before t=100 being complete.
        let operation = Operation::new(
            OperationType::new(2),
            Time::from_nanos(150),
            Time::from_nanos(100),
        );
        let mut handler = OperationHandler::new(
            operation.clone(),
            service.new_local_writer().unwrap(),
            Box::new(|_| Ok(())),
            Arc::clone(&fx.clock) as Arc<dyn TimeSource>,
            Arc::clone(&fx.metrics) as Arc<dyn MetricsSink>,
            Arc::clone(&fx.reporter),
        );
        handler.add_check(Box::new(DependencyTimeCheck::new(
            &operation,
            Arc::clone(&service) as Arc<dyn GlobalCompletionTimeReader>,
        )));

        let unblocker = {
            let service = Arc::clone(&service);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                lane.submit_initiated(Time::from_nanos(100)).unwrap();
                lane.submit_completed(Time::from_nanos(100)).unwrap();
                service.global_completion_time()
            })
        };

        assert_eq!(handler.run(&fx.spinner), HandlerOutcome::Executed);
        assert_eq!(unblocker.join().unwrap(), Some(Time::from_nanos(100)));
        // The handler's own progress moved the watermark to its timestamp.
        assert_eq!(
            service.global_completion_time(),
            Some(Time::from_nanos(150))
        );
        assert!(!fx.reporter.error_encountered());
    }
}

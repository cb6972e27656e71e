//! Fixed-size pool of handler workers.
//!
//! Workers pull wired handlers off a shared queue and drive each one to
//! completion, counting outcomes as they go. The queue is unbounded: the
//! dispatcher may run arbitrarily far ahead of execution, and backpressure
//! is the driver's business, not the pool's. Joining the pool closes the
//! queue, lets the workers run it dry, and waits for them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::exec::handler::{HandlerOutcome, OperationHandler};
use crate::reporter::ErrorReporter;
use crate::sched::Spinner;

const REPORT_SOURCE: &str = "handler-pool";

#[derive(Debug, Default)]
struct OutcomeCounters {
    executed: AtomicU64,
    failed: AtomicU64,
    not_executed: AtomicU64,
}

/// Counts of finished handlers by outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Handlers that executed and succeeded.
    pub executed: u64,
    /// Handlers that executed and failed.
    pub failed: u64,
    /// Handlers that never executed.
    pub not_executed: u64,
}

impl PoolStats {
    /// Handlers finished in total.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.executed + self.failed + self.not_executed
    }
}

/// The worker pool.
pub struct HandlerPool {
    tx: Sender<OperationHandler>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<OutcomeCounters>,
    reporter: Arc<ErrorReporter>,
}

impl HandlerPool {
    /// Starts `threads` workers sharing one spinner.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::PoolSpawn`] when a worker thread cannot be
    /// started; workers already started exit on their own.
    pub fn spawn(
        threads: usize,
        spinner: Arc<Spinner>,
        reporter: Arc<ErrorReporter>,
    ) -> Result<Self, DriverError> {
        let (tx, rx) = unbounded::<OperationHandler>();
        let counters = Arc::new(OutcomeCounters::default());
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let rx = rx.clone();
            let spinner = Arc::clone(&spinner);
            let counters = Arc::clone(&counters);
            let handle = std::thread::Builder::new()
                .name(format!("handler-worker-{index}"))
                .spawn(move || {
                    while let Ok(handler) = rx.recv() {
                        let counter = match handler.run(&spinner) {
                            HandlerOutcome::Executed => &counters.executed,
                            HandlerOutcome::ExecutionFailed => &counters.failed,
                            HandlerOutcome::NotExecuted => &counters.not_executed,
                        };
                        counter.fetch_add(1, Ordering::Release);
                    }
                })
                .map_err(|err| DriverError::PoolSpawn {
                    reason: err.to_string(),
                })?;
            workers.push(handle);
        }
        Ok(Self {
            tx,
            workers,
            counters,
            reporter,
        })
    }

    /// Queues one handler.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::PoolShutDown`] when the workers are gone.
    pub fn submit(&self, handler: OperationHandler) -> Result<(), DriverError> {
        self.tx
            .send(handler)
            .map_err(|_| DriverError::PoolShutDown)
    }

    /// Outcome counts so far.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            executed: self.counters.executed.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
            not_executed: self.counters.not_executed.load(Ordering::Acquire),
        }
    }

    /// Closes the queue, lets the workers drain it, and joins them.
    pub fn join(self) -> PoolStats {
        let Self {
            tx,
            workers,
            counters,
            reporter,
        } = self;
        drop(tx);
        for worker in workers {
            if worker.join().is_err() {
                reporter.report(REPORT_SOURCE, "handler worker panicked");
            }
        }
        PoolStats {
            executed: counters.executed.load(Ordering::Acquire),
            failed: counters.failed.load(Ordering::Acquire),
            not_executed: counters.not_executed.load(Ordering::Acquire),
        }
    }
}

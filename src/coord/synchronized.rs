//! Mutex-strategy completion-time service.
//!
//! The whole service is one [`WatermarkState`] plus the unresolved futures,
//! behind a single `parking_lot` mutex. Every submission, read, writer
//! creation, and future registration takes the lock. Futures are resolved
//! inside the same critical section that advanced the watermark, so a
//! resolved future is never observable before reads see the new value.
//!
//! Strictly ordered and easy to reason about, at the cost of serializing
//! every lane on the one lock. The queued strategy trades that ordering
//! point for a message queue.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::coord::future::{pending_pair, CompletionTimeFuture, CompletionTimePromise};
use crate::coord::state::WatermarkState;
use crate::coord::{
    CompletionTimeEvent, CompletionTimeService, GlobalCompletionTimeReader,
    LocalCompletionTimeWriter, PeerId, WriterId,
};
use crate::error::CoordinationError;
use crate::reporter::ErrorReporter;
use crate::time::Time;

const REPORT_SOURCE: &str = "completion-time-service";

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SyncInner {
    state: WatermarkState,
    /// Futures awaiting the next advancement. Registration and resolution
    /// both happen under the outer lock, so anything in here predates the
    /// advancement that drains it.
    pending: Vec<CompletionTimePromise>,
    next_writer: u32,
    shut_down: bool,
}

/// Completion-time service guarded by one mutex.
pub struct SynchronizedCompletionTimeService {
    inner: Arc<Mutex<SyncInner>>,
    reporter: Arc<ErrorReporter>,
}

impl SynchronizedCompletionTimeService {
    /// Creates the service for `local_peer` plus the fixed remote `peers`.
    #[must_use]
    pub fn new(local_peer: PeerId, peers: &[PeerId], reporter: Arc<ErrorReporter>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SyncInner {
                state: WatermarkState::new(local_peer, peers),
                pending: Vec::new(),
                next_writer: 0,
                shut_down: false,
            })),
            reporter,
        }
    }
}

/// Applies one submission under the lock, resolving futures on advancement.
///
/// Invariant violations are reported and returned; lifecycle misuse (a
/// shut-down service) is returned without a report.
fn apply_event(
    inner: &Mutex<SyncInner>,
    reporter: &ErrorReporter,
    event: CompletionTimeEvent,
) -> Result<(), CoordinationError> {
    let mut guard = inner.lock();
    if guard.shut_down {
        return Err(CoordinationError::ServiceShutDown);
    }
    match guard.state.apply(&event) {
        Ok(Some(gct)) => {
            let waiters = guard.pending.len();
            for promise in guard.pending.drain(..) {
                promise.resolve(gct);
            }
            tracing::trace!(gct = %gct, waiters, "watermark advanced");
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            drop(guard);
            reporter.report(REPORT_SOURCE, err.to_string());
            Err(err)
        }
    }
}

impl GlobalCompletionTimeReader for SynchronizedCompletionTimeService {
    fn global_completion_time(&self) -> Option<Time> {
        self.inner.lock().state.global_completion_time()
    }
}

impl CompletionTimeService for SynchronizedCompletionTimeService {
    fn new_local_writer(&self) -> Result<Arc<dyn LocalCompletionTimeWriter>, CoordinationError> {
        let mut guard = self.inner.lock();
        if guard.shut_down {
            return Err(CoordinationError::ServiceShutDown);
        }
        let id = WriterId::new(guard.next_writer);
        guard.next_writer += 1;
        tracing::debug!(%id, "local completion time writer created");
        Ok(Arc::new(SynchronizedWriter {
            id,
            inner: Arc::clone(&self.inner),
            reporter: Arc::clone(&self.reporter),
        }))
    }

    fn submit_peer_completed(&self, peer: &PeerId, time: Time) -> Result<(), CoordinationError> {
        apply_event(
            &self.inner,
            &self.reporter,
            CompletionTimeEvent::PeerCompleted {
                peer: peer.clone(),
                time,
            },
        )
    }

    fn global_completion_time_future(&self) -> Result<CompletionTimeFuture, CoordinationError> {
        let mut guard = self.inner.lock();
        if guard.shut_down {
            return Err(CoordinationError::ServiceShutDown);
        }
        let (promise, future) = pending_pair();
        guard.pending.push(promise);
        Ok(future)
    }

    fn shutdown(&self) -> Result<(), CoordinationError> {
        let mut guard = self.inner.lock();
        if guard.shut_down {
            return Err(CoordinationError::ServiceShutDown);
        }
        guard.shut_down = true;
        // Dropping an unresolved promise fails its future.
        let abandoned = guard.pending.len();
        guard.pending.clear();
        drop(guard);
        tracing::debug!(abandoned, "synchronized completion time service shut down");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

struct SynchronizedWriter {
    id: WriterId,
    inner: Arc<Mutex<SyncInner>>,
    reporter: Arc<ErrorReporter>,
}

impl std::fmt::Debug for SynchronizedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronizedWriter")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl LocalCompletionTimeWriter for SynchronizedWriter {
    fn id(&self) -> WriterId {
        self.id
    }

    fn submit_initiated(&self, time: Time) -> Result<(), CoordinationError> {
        apply_event(
            &self.inner,
            &self.reporter,
            CompletionTimeEvent::LocalInitiated {
                writer: self.id,
                time,
            },
        )
    }

    fn submit_completed(&self, time: Time) -> Result<(), CoordinationError> {
        apply_event(
            &self.inner,
            &self.reporter,
            CompletionTimeEvent::LocalCompleted {
                writer: self.id,
                time,
            },
        )
    }
}

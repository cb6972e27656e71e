//! Queue-strategy completion-time service.
//!
//! The watermark state lives on one dedicated background thread; writers
//! and the remote-peer path send [`CompletionTimeEvent`]s down a
//! `crossbeam` channel instead of taking a lock. The worker publishes every
//! advancement to an atomic cache, so `global_completion_time()` is a
//! single atomic load on the read side no matter how contended submission
//! is.
//!
//! Validation is therefore asynchronous: an ordering violation is detected
//! when the worker applies the event, surfaces through the shared
//! [`ErrorReporter`], and bumps the rejection counter in
//! [`QueuedServiceStats`]. Submission calls themselves only fail for
//! lifecycle reasons (shut down, worker gone).
//!
//! Futures ride the same queue: registration carries the watermark the
//! caller observed, and the worker resolves the promise during the update
//! step that first advances past it (immediately, if advancement already
//! happened in between).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

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

/// Cache value while the watermark is undefined. `Time::MAX` is reserved,
/// never a real watermark.
const GCT_UNSET: u64 = u64::MAX;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

enum ServiceMessage {
    Event(CompletionTimeEvent),
    RegisterFuture {
        /// Watermark the caller saw when asking; resolution requires
        /// advancing past it.
        observed: Option<Time>,
        promise: CompletionTimePromise,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StatsInner {
    events_processed: AtomicU64,
    submissions_rejected: AtomicU64,
    futures_registered: AtomicU64,
    futures_resolved: AtomicU64,
}

/// Point-in-time counters from the queued service's worker.
///
/// `events_processed` counts every submission the worker has applied,
/// accepted or rejected, in queue order. It is published after the
/// watermark cache for the same event, so observing `events_processed >= n`
/// guarantees the cached watermark reflects at least the first `n` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedServiceStats {
    /// Submissions processed so far, accepted or rejected, in queue order.
    pub events_processed: u64,
    /// Submissions rejected for ordering or peer-set violations.
    pub submissions_rejected: u64,
    /// Futures handed to the worker for resolution.
    pub futures_registered: u64,
    /// Futures resolved by an advancement.
    pub futures_resolved: u64,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Completion-time service backed by a dedicated worker thread.
pub struct QueuedCompletionTimeService {
    tx: Sender<ServiceMessage>,
    gct_cache: Arc<AtomicU64>,
    stats: Arc<StatsInner>,
    closed: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_writer: AtomicU32,
    reporter: Arc<ErrorReporter>,
}

impl QueuedCompletionTimeService {
    /// Starts the worker thread and returns the service for `local_peer`
    /// plus the fixed remote `peers`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::WorkerSpawn`] when the thread cannot be
    /// started.
    pub fn spawn(
        local_peer: PeerId,
        peers: &[PeerId],
        reporter: Arc<ErrorReporter>,
    ) -> Result<Self, CoordinationError> {
        let (tx, rx) = unbounded();
        let gct_cache = Arc::new(AtomicU64::new(GCT_UNSET));
        let stats = Arc::new(StatsInner::default());
        let state = WatermarkState::new(local_peer, peers);

        let worker = {
            let cache = Arc::clone(&gct_cache);
            let stats = Arc::clone(&stats);
            let reporter = Arc::clone(&reporter);
            std::thread::Builder::new()
                .name("completion-time-service".to_owned())
                .spawn(move || worker_loop(rx, state, &cache, &stats, &reporter))
                .map_err(|err| CoordinationError::WorkerSpawn {
                    reason: err.to_string(),
                })?
        };

        Ok(Self {
            tx,
            gct_cache,
            stats,
            closed: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(Some(worker)),
            next_writer: AtomicU32::new(0),
            reporter,
        })
    }

    /// Snapshot of the worker's counters.
    #[must_use]
    pub fn stats(&self) -> QueuedServiceStats {
        QueuedServiceStats {
            events_processed: self.stats.events_processed.load(Ordering::Acquire),
            submissions_rejected: self.stats.submissions_rejected.load(Ordering::Relaxed),
            futures_registered: self.stats.futures_registered.load(Ordering::Relaxed),
            futures_resolved: self.stats.futures_resolved.load(Ordering::Relaxed),
        }
    }

    fn send(&self, message: ServiceMessage) -> Result<(), CoordinationError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordinationError::ServiceShutDown);
        }
        self.tx
            .send(message)
            .map_err(|_| CoordinationError::ServiceUnavailable)
    }
}

impl GlobalCompletionTimeReader for QueuedCompletionTimeService {
    fn global_completion_time(&self) -> Option<Time> {
        match self.gct_cache.load(Ordering::Acquire) {
            GCT_UNSET => None,
            nanos => Some(Time::from_nanos(nanos)),
        }
    }
}

impl CompletionTimeService for QueuedCompletionTimeService {
    fn new_local_writer(&self) -> Result<Arc<dyn LocalCompletionTimeWriter>, CoordinationError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordinationError::ServiceShutDown);
        }
        let id = WriterId::new(self.next_writer.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, "local completion time writer created");
        Ok(Arc::new(QueuedWriter {
            id,
            tx: self.tx.clone(),
            closed: Arc::clone(&self.closed),
        }))
    }

    fn submit_peer_completed(&self, peer: &PeerId, time: Time) -> Result<(), CoordinationError> {
        self.send(ServiceMessage::Event(CompletionTimeEvent::PeerCompleted {
            peer: peer.clone(),
            time,
        }))
    }

    fn global_completion_time_future(&self) -> Result<CompletionTimeFuture, CoordinationError> {
        let observed = self.global_completion_time();
        let (promise, future) = pending_pair();
        self.send(ServiceMessage::RegisterFuture { observed, promise })?;
        Ok(future)
    }

    fn shutdown(&self) -> Result<(), CoordinationError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(CoordinationError::ServiceShutDown);
        }
        // The worker may already be gone if it panicked; join below is what
        // notices that.
        let _ = self.tx.send(ServiceMessage::Shutdown);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                self.reporter
                    .report(REPORT_SOURCE, "completion time worker panicked");
                return Err(CoordinationError::ServiceUnavailable);
            }
        }
        tracing::debug!("queued completion time service shut down");
        Ok(())
    }
}

impl Drop for QueuedCompletionTimeService {
    fn drop(&mut self) {
        // Best effort: let the worker exit promptly without joining it.
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(ServiceMessage::Shutdown);
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

fn worker_loop(
    rx: Receiver<ServiceMessage>,
    mut state: WatermarkState,
    cache: &AtomicU64,
    stats: &StatsInner,
    reporter: &ErrorReporter,
) {
    let mut pending: Vec<(Option<Time>, CompletionTimePromise)> = Vec::new();

    while let Ok(message) = rx.recv() {
        match message {
            ServiceMessage::Event(event) => {
                match state.apply(&event) {
                    Ok(Some(gct)) => {
                        // Cache before the processed-count bump so anyone
                        // who has seen the count also sees the watermark.
                        cache.store(gct.as_nanos(), Ordering::Release);
                        resolve_passed(&mut pending, gct, stats);
                        tracing::trace!(gct = %gct, "watermark advanced");
                    }
                    Ok(None) => {}
                    Err(err) => {
                        stats.submissions_rejected.fetch_add(1, Ordering::Relaxed);
                        reporter.report(REPORT_SOURCE, err.to_string());
                    }
                }
                stats.events_processed.fetch_add(1, Ordering::Release);
            }
            ServiceMessage::RegisterFuture { observed, promise } => {
                stats.futures_registered.fetch_add(1, Ordering::Relaxed);
                match state.global_completion_time() {
                    // Advancement raced the registration; settle it now.
                    Some(current) if observed.map_or(true, |seen| current > seen) => {
                        promise.resolve(current);
                        stats.futures_resolved.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => pending.push((observed, promise)),
                }
            }
            ServiceMessage::Shutdown => break,
        }
    }

    // Dropping unresolved promises fails their futures.
    tracing::debug!(
        abandoned = pending.len(),
        "completion time worker exiting"
    );
}

fn resolve_passed(
    pending: &mut Vec<(Option<Time>, CompletionTimePromise)>,
    gct: Time,
    stats: &StatsInner,
) {
    let mut index = 0;
    while index < pending.len() {
        if pending[index].0.map_or(true, |seen| gct > seen) {
            let (_, promise) = pending.swap_remove(index);
            promise.resolve(gct);
            stats.futures_resolved.fetch_add(1, Ordering::Relaxed);
        } else {
            index += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

struct QueuedWriter {
    id: WriterId,
    tx: Sender<ServiceMessage>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for QueuedWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedWriter")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl QueuedWriter {
    fn send(&self, event: CompletionTimeEvent) -> Result<(), CoordinationError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordinationError::ServiceShutDown);
        }
        self.tx
            .send(ServiceMessage::Event(event))
            .map_err(|_| CoordinationError::ServiceUnavailable)
    }
}

impl LocalCompletionTimeWriter for QueuedWriter {
    fn id(&self) -> WriterId {
        self.id
    }

    fn submit_initiated(&self, time: Time) -> Result<(), CoordinationError> {
        self.send(CompletionTimeEvent::LocalInitiated {
            writer: self.id,
            time,
        })
    }

    fn submit_completed(&self, time: Time) -> Result<(), CoordinationError> {
        self.send(CompletionTimeEvent::LocalCompleted {
            writer: self.id,
            time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{TryWaitError, WaitError};
    use std::time::Duration;

    fn make(peers: &[&str]) -> (QueuedCompletionTimeService, Arc<ErrorReporter>) {
        let peers: Vec<PeerId> = peers.iter().map(|p| PeerId::new(*p)).collect();
        let reporter = Arc::new(ErrorReporter::new());
        let service =
            QueuedCompletionTimeService::spawn(PeerId::new("local"), &peers, Arc::clone(&reporter))
                .unwrap();
        (service, reporter)
    }

    /// Blocks until the worker has applied at least `count` submissions.
    fn wait_for_events(service: &QueuedCompletionTimeService, count: u64) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while service.stats().events_processed < count {
            assert!(
                std::time::Instant::now() < deadline,
                "worker stuck below {count} events: {:?}",
                service.stats()
            );
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn watermark_defined_once_everyone_reports() {
        let (service, reporter) = make(&["remote"]);
        let writer = service.new_local_writer().unwrap();

        writer.submit_initiated(Time::from_nanos(100)).unwrap();
        writer.submit_completed(Time::from_nanos(100)).unwrap();
        wait_for_events(&service, 2);
        assert_eq!(service.global_completion_time(), None);

        service
            .submit_peer_completed(&PeerId::new("remote"), Time::from_nanos(100))
            .unwrap();
        wait_for_events(&service, 3);
        assert_eq!(service.global_completion_time(), Some(Time::from_nanos(100)));
        assert!(!reporter.error_encountered());
    }

    #[test]
    fn slow_peer_holds_the_watermark_back() {
        let (service, _) = make(&["remote"]);
        let writer = service.new_local_writer().unwrap();
        writer.submit_initiated(Time::from_nanos(100)).unwrap();
        writer.submit_completed(Time::from_nanos(100)).unwrap();
        service
            .submit_peer_completed(&PeerId::new("remote"), Time::from_nanos(50))
            .unwrap();
        wait_for_events(&service, 3);

        assert_eq!(service.global_completion_time(), Some(Time::from_nanos(50)));
    }

    #[test]
    fn rejection_surfaces_through_reporter_and_stats() {
        let (service, reporter) = make(&["remote"]);
        let writer = service.new_local_writer().unwrap();
        writer.submit_initiated(Time::from_nanos(100)).unwrap();
        writer.submit_completed(Time::from_nanos(100)).unwrap();
        service
            .submit_peer_completed(&PeerId::new("remote"), Time::from_nanos(100))
            .unwrap();

        // Accepted by the queue, rejected by the worker.
        writer.submit_completed(Time::from_nanos(50)).unwrap();
        wait_for_events(&service, 4);

        assert!(reporter.error_encountered());
        assert_eq!(service.stats().submissions_rejected, 1);
        assert_eq!(service.global_completion_time(), Some(Time::from_nanos(100)));
        let first = reporter.first_error().unwrap();
        assert!(first.message.contains("out-of-order"));
    }

    #[test]
    fn future_resolves_on_first_definition() {
        let (service, _) = make(&[]);
        let future = service.global_completion_time_future().unwrap();

        let writer = service.new_local_writer().unwrap();
        writer.submit_initiated(Time::from_nanos(10)).unwrap();
        writer.submit_completed(Time::from_nanos(10)).unwrap();

        assert_eq!(future.wait(), Ok(Time::from_nanos(10)));
        wait_for_events(&service, 2);
        let stats = service.stats();
        assert_eq!(stats.futures_registered, 1);
        assert_eq!(stats.futures_resolved, 1);
    }

    #[test]
    fn future_requested_after_advancement_still_resolves() {
        let (service, _) = make(&[]);
        let writer = service.new_local_writer().unwrap();
        writer.submit_initiated(Time::from_nanos(10)).unwrap();
        writer.submit_completed(Time::from_nanos(10)).unwrap();
        wait_for_events(&service, 2);

        // The caller observed None if the cache read raced the worker; the
        // worker settles such futures immediately from its own state.
        let future = service.global_completion_time_future().unwrap();
        writer.submit_initiated(Time::from_nanos(20)).unwrap();
        writer.submit_completed(Time::from_nanos(20)).unwrap();
        assert_eq!(future.wait(), Ok(Time::from_nanos(20)));
    }

    #[test]
    fn future_ignores_submissions_that_do_not_advance() {
        let (service, _) = make(&[]);
        let writer = service.new_local_writer().unwrap();
        writer.submit_initiated(Time::from_nanos(10)).unwrap();
        writer.submit_completed(Time::from_nanos(10)).unwrap();
        wait_for_events(&service, 2);

        let future = service.global_completion_time_future().unwrap();
        writer.submit_completed(Time::from_nanos(10)).unwrap();
        wait_for_events(&service, 3);
        assert_eq!(future.try_wait(), Err(TryWaitError::Pending));

        writer.submit_initiated(Time::from_nanos(20)).unwrap();
        writer.submit_completed(Time::from_nanos(20)).unwrap();
        assert_eq!(future.wait(), Ok(Time::from_nanos(20)));
    }

    #[test]
    fn shutdown_fails_pending_futures() {
        let (service, _) = make(&[]);
        let future = service.global_completion_time_future().unwrap();
        service.shutdown().unwrap();
        assert_eq!(future.wait(), Err(WaitError::Shutdown));
    }

    #[test]
    fn shutdown_is_not_idempotent_but_safe() {
        let (service, reporter) = make(&[]);
        service.shutdown().unwrap();
        assert!(matches!(
            service.shutdown(),
            Err(CoordinationError::ServiceShutDown)
        ));
        assert!(!reporter.error_encountered());
    }

    #[test]
    fn everything_rejects_after_shutdown() {
        let (service, _) = make(&["remote"]);
        let writer = service.new_local_writer().unwrap();
        service.shutdown().unwrap();

        assert!(matches!(
            writer.submit_initiated(Time::from_nanos(1)),
            Err(CoordinationError::ServiceShutDown)
        ));
        assert!(matches!(
            writer.submit_completed(Time::from_nanos(1)),
            Err(CoordinationError::ServiceShutDown)
        ));
        assert!(matches!(
            service.submit_peer_completed(&PeerId::new("remote"), Time::from_nanos(1)),
            Err(CoordinationError::ServiceShutDown)
        ));
        assert!(matches!(
            service.new_local_writer(),
            Err(CoordinationError::ServiceShutDown)
        ));
        assert!(matches!(
            service.global_completion_time_future(),
            Err(CoordinationError::ServiceShutDown)
        ));
    }

    #[test]
    fn writers_get_distinct_ids() {
        let (service, _) = make(&[]);
        let a = service.new_local_writer().unwrap();
        let b = service.new_local_writer().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn counts_every_event_including_rejections() {
        let (service, _) = make(&[]);
        let writer = service.new_local_writer().unwrap();
        writer.submit_initiated(Time::from_nanos(5)).unwrap();
        writer.submit_completed(Time::from_nanos(9)).unwrap();
        writer.submit_completed(Time::from_nanos(5)).unwrap();
        wait_for_events(&service, 3);

        let stats = service.stats();
        assert_eq!(stats.events_processed, 3);
        assert_eq!(stats.submissions_rejected, 1);
        service.shutdown().unwrap();
    }
}

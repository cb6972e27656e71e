//! Completion-time coordination.
//!
//! Tracks, per peer, the highest known *initiated* and *completed*
//! timestamps, and derives the **global completion time**: the minimum
//! completed time across every participant, a monotonic watermark below
//! which no peer can still be initiating work. Dependent operations are
//! gated on it by the scheduler.
//!
//! # Roles
//!
//! - [`LocalCompletionTimeWriter`]: submission handle for the local peer,
//!   one per dispatch lane. All writers feed the same local record.
//! - [`GlobalCompletionTimeReader`]: read-only view of the watermark, the
//!   only thing the dependency gate ever touches.
//! - [`CompletionTimeService`]: the full service contract, combining the
//!   reader with writer creation, remote-peer submission, futures that
//!   resolve on watermark advancement, and shutdown.
//!
//! # Strategies
//!
//! Two interchangeable implementations exist behind the service trait:
//! [`SynchronizedCompletionTimeService`] guards the state table with one
//! mutex; [`QueuedCompletionTimeService`] gives the table to a dedicated
//! background thread fed by a queue, with lock-free watermark reads. Both
//! produce identical watermark sequences for identical submission
//! sequences; they differ only in throughput under contention.

mod event;
mod future;
mod queued;
mod state;
mod synchronized;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoordinationError;
use crate::reporter::ErrorReporter;
use crate::time::Time;

pub(crate) use event::CompletionTimeEvent;
pub use future::{CompletionTimeFuture, TryWaitError, WaitError};
pub use queued::{QueuedCompletionTimeService, QueuedServiceStats};
pub use synchronized::SynchronizedCompletionTimeService;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a participant in the benchmark run.
///
/// The peer set is fixed when a service is constructed; submissions naming
/// any other peer are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Creates a peer id from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The peer's name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Identifier of a local completion-time writer.
///
/// Diagnostic only: it names the lane in rejection errors. The stub writer
/// handed to untracked operations uses [`WriterId::STUB`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriterId(u32);

impl WriterId {
    /// Id of the shared no-op writer stub.
    pub const STUB: Self = Self(u32::MAX);

    /// Creates a writer id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for WriterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == Self::STUB {
            f.write_str("writer-stub")
        } else {
            write!(f, "writer-{}", self.0)
        }
    }
}

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Read-only access to the global completion time.
pub trait GlobalCompletionTimeReader: Send + Sync {
    /// The current watermark, or `None` until the local peer and every
    /// remote peer have reported a completed time. Never blocks; returns
    /// the best known lower bound immediately.
    fn global_completion_time(&self) -> Option<Time>;
}

/// Submission handle for the local peer's progress.
///
/// Submissions must be non-decreasing in the order made through this
/// handle; an out-of-order submission is rejected and reported, never
/// silently reordered. The synchronized strategy returns the rejection
/// from the call; the queued strategy validates on its worker and
/// surfaces the rejection through the shared [`ErrorReporter`] only, the
/// call itself failing just for lifecycle reasons.
pub trait LocalCompletionTimeWriter: Send + Sync + std::fmt::Debug {
    /// This writer's lane id.
    fn id(&self) -> WriterId;

    /// Records that the local peer has begun work scheduled at or after
    /// `time`.
    ///
    /// # Errors
    ///
    /// [`CoordinationError::InitiatedOutOfOrder`] when `time` is below the
    /// local initiated record and validation is synchronous;
    /// [`CoordinationError::ServiceShutDown`] after shutdown either way.
    fn submit_initiated(&self, time: Time) -> Result<(), CoordinationError>;

    /// Records that the local peer has finished all work at or before
    /// `time`.
    ///
    /// # Errors
    ///
    /// Rejected when `time` exceeds the local initiated record or goes
    /// backwards and validation is synchronous;
    /// [`CoordinationError::ServiceShutDown`] after shutdown either way.
    fn submit_completed(&self, time: Time) -> Result<(), CoordinationError>;
}

/// The completion-time coordination service.
pub trait CompletionTimeService: GlobalCompletionTimeReader {
    /// Creates a new local submission handle. Called once per dispatch
    /// lane.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::ServiceShutDown`] after shutdown.
    fn new_local_writer(&self) -> Result<Arc<dyn LocalCompletionTimeWriter>, CoordinationError>;

    /// Records a remote peer's completed time: the peer has finished
    /// everything up to and including `time`.
    ///
    /// # Errors
    ///
    /// Rejected for unknown peers and non-monotonic times when validation
    /// is synchronous, and for a shut-down service always.
    fn submit_peer_completed(&self, peer: &PeerId, time: Time) -> Result<(), CoordinationError>;

    /// Returns a future that resolves once the watermark advances past the
    /// value observed at this call. A watermark going from undefined to its
    /// first value counts as advancement.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::ServiceShutDown`] after shutdown.
    fn global_completion_time_future(&self) -> Result<CompletionTimeFuture, CoordinationError>;

    /// Shuts the service down, releasing any background resources and
    /// failing all unresolved futures. Not idempotent: a second call is a
    /// usage error and returns [`CoordinationError::ServiceShutDown`], but
    /// neither corrupts state nor hangs.
    ///
    /// # Errors
    ///
    /// See above.
    fn shutdown(&self) -> Result<(), CoordinationError>;
}

// ---------------------------------------------------------------------------
// No-op writer
// ---------------------------------------------------------------------------

/// Writer stub for operations outside completion-time tracking.
///
/// Accepts every submission and records nothing. Handed out by the
/// dispatcher so untracked handlers follow the same submission protocol as
/// tracked ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLocalWriter;

impl LocalCompletionTimeWriter for NoopLocalWriter {
    fn id(&self) -> WriterId {
        WriterId::STUB
    }

    fn submit_initiated(&self, _time: Time) -> Result<(), CoordinationError> {
        Ok(())
    }

    fn submit_completed(&self, _time: Time) -> Result<(), CoordinationError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// Which service implementation computes the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompletionTimeStrategy {
    /// One mutex around the state table; every submission and read
    /// acquires it.
    Synchronized,
    /// Single-consumer queue into a dedicated background thread that owns
    /// the table; watermark reads are lock-free.
    #[default]
    Queued,
}

impl CompletionTimeStrategy {
    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synchronized => "synchronized",
            Self::Queued => "queued",
        }
    }
}

impl std::fmt::Display for CompletionTimeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared handles to one service instance, pre-coerced to the two roles
/// consumers need.
#[derive(Clone)]
pub struct ServiceHandles {
    /// The full service contract.
    pub service: Arc<dyn CompletionTimeService>,
    /// The read-only watermark view, for dependency gates.
    pub reader: Arc<dyn GlobalCompletionTimeReader>,
}

/// Builds a completion-time service for the chosen strategy.
///
/// `peers` are the remote participants; the local peer is implicit and
/// labelled `local_peer` in diagnostics.
///
/// # Errors
///
/// Returns [`CoordinationError::WorkerSpawn`] when the queued strategy's
/// background thread cannot be started.
pub fn new_completion_time_service(
    strategy: CompletionTimeStrategy,
    local_peer: PeerId,
    peers: &[PeerId],
    reporter: Arc<ErrorReporter>,
) -> Result<ServiceHandles, CoordinationError> {
    match strategy {
        CompletionTimeStrategy::Synchronized => {
            let service = Arc::new(SynchronizedCompletionTimeService::new(
                local_peer, peers, reporter,
            ));
            Ok(ServiceHandles {
                reader: service.clone(),
                service,
            })
        }
        CompletionTimeStrategy::Queued => {
            let service = Arc::new(QueuedCompletionTimeService::spawn(
                local_peer, peers, reporter,
            )?);
            Ok(ServiceHandles {
                reader: service.clone(),
                service,
            })
        }
    }
}

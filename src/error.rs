//! Error types for the driver core.
//!
//! Each subsystem has its own enum so callers can match on what actually
//! went wrong:
//!
//! - [`CoordinationError`]: completion-time service rejections and lifecycle
//!   misuse. Ordering violations reject the offending submission and leave
//!   the watermark untouched.
//! - [`WorkloadError`]: operation-stream configuration problems, fatal at
//!   startup or first use.
//! - [`ExecutionError`]: failures from the external execution adapter; these
//!   mark a single operation failed while the run continues.
//! - [`DriverError`]: umbrella for the run orchestration layer.

use thiserror::Error;

use crate::coord::{PeerId, WriterId};
use crate::time::Time;
use crate::workload::OperationType;

/// Errors raised by the completion-time coordination service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    /// An initiated-time submission went backwards for a peer.
    #[error(
        "out-of-order initiated time for peer {peer}: submitted {submitted} by {writer}, \
         last known {last_known}"
    )]
    InitiatedOutOfOrder {
        /// Peer whose record would have gone backwards.
        peer: PeerId,
        /// Writer that made the submission.
        writer: WriterId,
        /// The rejected timestamp.
        submitted: Time,
        /// The peer's current initiated watermark.
        last_known: Time,
    },

    /// A completed-time submission went backwards for a peer.
    #[error(
        "out-of-order completed time for peer {peer}: submitted {submitted}, \
         last known {last_known}"
    )]
    CompletedOutOfOrder {
        /// Peer whose record would have gone backwards.
        peer: PeerId,
        /// The rejected timestamp.
        submitted: Time,
        /// The peer's current completed watermark.
        last_known: Time,
    },

    /// A completed time ran ahead of the peer's initiated record.
    ///
    /// `last_initiated` is `None` when nothing was ever initiated, in which
    /// case no completion is acceptable at all.
    #[error(
        "completed time {submitted} for peer {peer} ahead of initiated record \
         {last_initiated:?}"
    )]
    CompletedAheadOfInitiated {
        /// Peer the submission was for.
        peer: PeerId,
        /// The rejected timestamp.
        submitted: Time,
        /// The peer's current initiated watermark, if any.
        last_initiated: Option<Time>,
    },

    /// A submission named a peer outside the fixed peer set.
    #[error("unknown peer {peer}: not in the peer set fixed at service construction")]
    UnknownPeer {
        /// The unrecognized peer id.
        peer: PeerId,
    },

    /// The service has been shut down; also returned by a second shutdown
    /// call.
    #[error("completion time service is shut down")]
    ServiceShutDown,

    /// The service's background worker is gone without an orderly shutdown.
    #[error("completion time service unavailable: background worker disconnected")]
    ServiceUnavailable,

    /// The background worker thread could not be started.
    #[error("failed to spawn completion time worker thread: {reason}")]
    WorkerSpawn {
        /// Operating system error description.
        reason: String,
    },
}

/// Operation-stream configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkloadError {
    /// An operation type has no entry in the classification table.
    #[error("no classification for operation type {op_type}")]
    UnclassifiedOperation {
        /// The unmapped operation type.
        op_type: OperationType,
    },
}

/// Failures from the external execution adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The adapter has no executor for this operation type.
    #[error("execution adapter has no executor for operation type {op_type}")]
    NoExecutor {
        /// The unhandled operation type.
        op_type: OperationType,
    },

    /// The operation ran and failed inside the system under test.
    #[error("operation failed in system under test: {message}")]
    Failed {
        /// Adapter-supplied failure description.
        message: String,
    },
}

/// Umbrella error for driver runs.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Invalid driver configuration.
    #[error("invalid driver configuration: {reason}")]
    Config {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// Coordination-service failure.
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Operation-stream configuration failure.
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    /// Execution-adapter failure while wiring handlers.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// A worker pool thread could not be started.
    #[error("failed to spawn handler pool worker: {reason}")]
    PoolSpawn {
        /// Operating system error description.
        reason: String,
    },

    /// The handler pool's workers are gone; nothing can be submitted.
    #[error("handler pool is shut down")]
    PoolShutDown,
}

//! Submission events applied to the watermark state.

use crate::coord::{PeerId, WriterId};
use crate::time::Time;

/// One mutating submission.
///
/// Both service strategies reduce their public submission surface to this
/// event type before touching state, so the state machine sees identical
/// inputs regardless of strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CompletionTimeEvent {
    /// Local peer began work scheduled at or after `time`.
    LocalInitiated {
        /// Lane the submission came through.
        writer: WriterId,
        /// Submitted timestamp.
        time: Time,
    },
    /// Local peer finished all work at or before `time`.
    LocalCompleted {
        /// Lane the submission came through.
        writer: WriterId,
        /// Submitted timestamp.
        time: Time,
    },
    /// A remote peer finished everything up to and including `time`.
    PeerCompleted {
        /// The reporting peer.
        peer: PeerId,
        /// Submitted timestamp.
        time: Time,
    },
}

impl CompletionTimeEvent {
    /// The submitted timestamp, whichever kind of event this is.
    pub(crate) fn time(&self) -> Time {
        match self {
            Self::LocalInitiated { time, .. }
            | Self::LocalCompleted { time, .. }
            | Self::PeerCompleted { time, .. } => *time,
        }
    }
}

//! The watermark state machine.
//!
//! Pure, single-owner state shared by both service strategies: the
//! synchronized service mutates it under a mutex, the queued service from
//! its background thread. Because both reduce submissions to
//! [`CompletionTimeEvent`]s applied here, the strategies cannot diverge on
//! what the watermark does, only on how fast they do it.
//!
//! Invariants enforced per peer (local included):
//!
//! - completed time never exceeds initiated time,
//! - both records are non-decreasing.
//!
//! A submission violating either is rejected with a typed error and leaves
//! every record, and the derived global completion time, untouched.

use std::collections::BTreeMap;

use crate::coord::{CompletionTimeEvent, PeerId};
use crate::error::CoordinationError;
use crate::time::Time;

/// Per-peer records plus the cached global completion time.
#[derive(Debug)]
pub(crate) struct WatermarkState {
    local_peer: PeerId,
    local_initiated: Option<Time>,
    local_completed: Option<Time>,
    /// Remote peers' completed times, `None` until first report.
    peers: BTreeMap<PeerId, Option<Time>>,
    global: Option<Time>,
}

impl WatermarkState {
    /// Creates state for the local peer plus the fixed remote peer set.
    pub(crate) fn new(local_peer: PeerId, peers: &[PeerId]) -> Self {
        Self {
            local_peer,
            local_initiated: None,
            local_completed: None,
            peers: peers.iter().cloned().map(|p| (p, None)).collect(),
            global: None,
        }
    }

    /// The current global completion time: the minimum completed time
    /// across the local peer and every remote peer, `None` while any of
    /// them has yet to report one.
    pub(crate) fn global_completion_time(&self) -> Option<Time> {
        self.global
    }

    /// The local peer's initiated record.
    #[cfg(test)]
    pub(crate) fn local_initiated(&self) -> Option<Time> {
        self.local_initiated
    }

    /// The local peer's completed record.
    #[cfg(test)]
    pub(crate) fn local_completed(&self) -> Option<Time> {
        self.local_completed
    }

    /// Applies one submission. Returns the new global completion time when
    /// the submission advanced it, `None` when the watermark is unchanged.
    ///
    /// Rejected submissions return the violation and change nothing.
    pub(crate) fn apply(
        &mut self,
        event: &CompletionTimeEvent,
    ) -> Result<Option<Time>, CoordinationError> {
        match event {
            CompletionTimeEvent::LocalInitiated { writer, time } => {
                if let Some(last) = self.local_initiated {
                    if *time < last {
                        return Err(CoordinationError::InitiatedOutOfOrder {
                            peer: self.local_peer.clone(),
                            writer: *writer,
                            submitted: *time,
                            last_known: last,
                        });
                    }
                }
                self.local_initiated = Some(*time);
            }
            CompletionTimeEvent::LocalCompleted { time, .. } => {
                match self.local_initiated {
                    Some(initiated) if *time <= initiated => {}
                    last_initiated => {
                        return Err(CoordinationError::CompletedAheadOfInitiated {
                            peer: self.local_peer.clone(),
                            submitted: *time,
                            last_initiated,
                        });
                    }
                }
                if let Some(last) = self.local_completed {
                    if *time < last {
                        return Err(CoordinationError::CompletedOutOfOrder {
                            peer: self.local_peer.clone(),
                            submitted: *time,
                            last_known: last,
                        });
                    }
                }
                self.local_completed = Some(*time);
            }
            CompletionTimeEvent::PeerCompleted { peer, time } => {
                let slot = self
                    .peers
                    .get_mut(peer)
                    .ok_or_else(|| CoordinationError::UnknownPeer { peer: peer.clone() })?;
                if let Some(last) = *slot {
                    if *time < last {
                        return Err(CoordinationError::CompletedOutOfOrder {
                            peer: peer.clone(),
                            submitted: *time,
                            last_known: last,
                        });
                    }
                }
                *slot = Some(*time);
            }
        }
        Ok(self.recompute_global())
    }

    /// Recomputes the global completion time from the per-peer records.
    /// Returns the new value when it changed.
    fn recompute_global(&mut self) -> Option<Time> {
        let candidate = self.min_completed();
        if candidate == self.global {
            return None;
        }
        debug_assert!(
            candidate > self.global,
            "global completion time went backwards: {:?} -> {candidate:?}",
            self.global
        );
        self.global = candidate;
        candidate
    }

    fn min_completed(&self) -> Option<Time> {
        let mut min = self.local_completed?;
        for completed in self.peers.values() {
            min = min.min((*completed)?);
        }
        Some(min)
    }
}

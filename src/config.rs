//! Driver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coord::{CompletionTimeStrategy, PeerId};
use crate::error::DriverError;
use crate::sched::DEFAULT_GRANULARITY;
use crate::time::Time;

/// Default number of handler worker threads.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Default number of operations wired per dispatch batch.
pub const DEFAULT_DISPATCH_BATCH: usize = 128;

/// Everything a [`Driver`](crate::exec::Driver) run needs to know up front.
///
/// Construct with [`Default`] plus the `with_*` setters, or deserialize
/// from configuration; missing fields take their defaults either way.
/// [`validate`](Self::validate) runs when the driver is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Which completion-time service implementation to run.
    pub strategy: CompletionTimeStrategy,
    /// This process's identity in diagnostics.
    pub local_peer: PeerId,
    /// Remote participants whose completed times gate the watermark.
    pub peers: Vec<PeerId>,
    /// Handler pool size.
    pub worker_threads: usize,
    /// Spinner polling interval.
    pub spinner_granularity: Duration,
    /// How far ahead of its scheduled time an operation may start.
    pub early_start_tolerance: Duration,
    /// Operations wired per dispatcher pass.
    pub dispatch_batch: usize,
    /// Initiated and completed time the driver submits before dispatching,
    /// giving the watermark a defined starting value.
    ///
    /// Without it the watermark stays undefined until the first
    /// dependency-tracked operation completes, so a workload whose first
    /// tracked operation is itself gated would wait forever. Set it at or
    /// after that operation's dependency time and at or before the
    /// earliest tracked scheduled start.
    pub initial_completion_time: Option<Time>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            strategy: CompletionTimeStrategy::default(),
            local_peer: PeerId::new("local"),
            peers: Vec::new(),
            worker_threads: DEFAULT_WORKER_THREADS,
            spinner_granularity: DEFAULT_GRANULARITY,
            early_start_tolerance: Duration::ZERO,
            dispatch_batch: DEFAULT_DISPATCH_BATCH,
            initial_completion_time: None,
        }
    }
}

impl DriverConfig {
    /// Sets the completion-time strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: CompletionTimeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Names the local peer.
    #[must_use]
    pub fn with_local_peer(mut self, peer: PeerId) -> Self {
        self.local_peer = peer;
        self
    }

    /// Sets the remote peer set.
    #[must_use]
    pub fn with_peers(mut self, peers: Vec<PeerId>) -> Self {
        self.peers = peers;
        self
    }

    /// Sets the handler pool size.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Sets the spinner polling interval.
    #[must_use]
    pub fn with_spinner_granularity(mut self, granularity: Duration) -> Self {
        self.spinner_granularity = granularity;
        self
    }

    /// Allows operations to start this far ahead of schedule.
    #[must_use]
    pub fn with_early_start_tolerance(mut self, tolerance: Duration) -> Self {
        self.early_start_tolerance = tolerance;
        self
    }

    /// Sets the dispatch batch size.
    #[must_use]
    pub fn with_dispatch_batch(mut self, batch: usize) -> Self {
        self.dispatch_batch = batch;
        self
    }

    /// Seeds the watermark with this time at run start.
    #[must_use]
    pub fn with_initial_completion_time(mut self, time: Time) -> Self {
        self.initial_completion_time = Some(time);
        self
    }

    /// Rejects configurations the run could not execute.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] naming the first problem found.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.worker_threads == 0 {
            return Err(DriverError::Config {
                reason: "worker_threads must be at least 1".to_owned(),
            });
        }
        if self.dispatch_batch == 0 {
            return Err(DriverError::Config {
                reason: "dispatch_batch must be at least 1".to_owned(),
            });
        }
        if self.peers.contains(&self.local_peer) {
            return Err(DriverError::Config {
                reason: format!("local peer {} also listed as a remote peer", self.local_peer),
            });
        }
        for (index, peer) in self.peers.iter().enumerate() {
            if self.peers[..index].contains(peer) {
                return Err(DriverError::Config {
                    reason: format!("remote peer {peer} listed twice"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        DriverConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_workers_rejected() {
        let err = DriverConfig::default()
            .with_worker_threads(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("worker_threads"));
    }

    #[test]
    fn local_peer_may_not_be_remote() {
        let err = DriverConfig::default()
            .with_local_peer(PeerId::new("a"))
            .with_peers(vec![PeerId::new("a")])
            .validate()
            .unwrap_err();
        assert!(matches!(err, DriverError::Config { .. }));
    }

    #[test]
    fn duplicate_remote_peers_rejected() {
        let err = DriverConfig::default()
            .with_peers(vec![PeerId::new("a"), PeerId::new("b"), PeerId::new("a")])
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }

    #[test]
    fn deserializes_with_defaults_for_missing_fields() {
        let config: DriverConfig =
            serde_json::from_str(r#"{"strategy":"Synchronized","peers":["r1","r2"]}"#).unwrap();
        assert_eq!(config.strategy, CompletionTimeStrategy::Synchronized);
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.worker_threads, DEFAULT_WORKER_THREADS);
        assert_eq!(config.dispatch_batch, DEFAULT_DISPATCH_BATCH);
        assert_eq!(config.initial_completion_time, None);
    }

    #[test]
    fn round_trips_through_json() {
        let config = DriverConfig::default()
            .with_strategy(CompletionTimeStrategy::Queued)
            .with_peers(vec![PeerId::new("remote")])
            .with_worker_threads(8)
            .with_initial_completion_time(Time::from_millis(5));
        let json = serde_json::to_string(&config).unwrap();
        let back: DriverConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}

//! Futures that resolve when the watermark advances.
//!
//! A [`CompletionTimeFuture`] is handed to callers that need to wait for
//! forward progress rather than poll. The service side keeps the paired
//! [`CompletionTimePromise`] and resolves it during the same state update
//! that advanced the watermark, so a resolved future always reflects a
//! real advancement past the value observed when it was requested.
//!
//! Dropping a promise without resolving it (service shutdown, or a service
//! dropped mid-run) fails the future instead of leaving waiters hanging.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::time::Time;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error returned when waiting on a completion-time future fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The service shut down before the watermark advanced again.
    Shutdown,
    /// The wait's timeout elapsed first.
    TimedOut,
}

impl std::fmt::Display for WaitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shutdown => write!(f, "completion time service shut down before advancement"),
            Self::TimedOut => write!(f, "timed out waiting for watermark advancement"),
        }
    }
}

impl std::error::Error for WaitError {}

/// Error returned by [`CompletionTimeFuture::try_wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryWaitError {
    /// The watermark has not advanced yet.
    Pending,
    /// The service shut down before the watermark advanced again.
    Shutdown,
}

impl std::fmt::Display for TryWaitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "watermark has not advanced yet"),
            Self::Shutdown => write!(f, "completion time service shut down before advancement"),
        }
    }
}

impl std::error::Error for TryWaitError {}

// ---------------------------------------------------------------------------
// Shared cell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FutureCell {
    Pending,
    Resolved(Time),
    Abandoned,
}

#[derive(Debug)]
struct Shared {
    cell: Mutex<FutureCell>,
    cond: Condvar,
}

/// Creates a connected promise/future pair.
pub(crate) fn pending_pair() -> (CompletionTimePromise, CompletionTimeFuture) {
    let shared = Arc::new(Shared {
        cell: Mutex::new(FutureCell::Pending),
        cond: Condvar::new(),
    });
    (
        CompletionTimePromise {
            shared: Arc::clone(&shared),
            fulfilled: false,
        },
        CompletionTimeFuture { shared },
    )
}

// ---------------------------------------------------------------------------
// Promise (service side)
// ---------------------------------------------------------------------------

/// Resolver half, held by the service until the watermark advances.
#[derive(Debug)]
pub(crate) struct CompletionTimePromise {
    shared: Arc<Shared>,
    fulfilled: bool,
}

impl CompletionTimePromise {
    /// Resolves the paired future with the advanced watermark.
    pub(crate) fn resolve(mut self, gct: Time) {
        *self.shared.cell.lock() = FutureCell::Resolved(gct);
        self.shared.cond.notify_all();
        self.fulfilled = true;
    }
}

impl Drop for CompletionTimePromise {
    fn drop(&mut self) {
        if !self.fulfilled {
            let mut cell = self.shared.cell.lock();
            if *cell == FutureCell::Pending {
                *cell = FutureCell::Abandoned;
            }
            drop(cell);
            self.shared.cond.notify_all();
        }
    }
}

// ---------------------------------------------------------------------------
// Future (caller side)
// ---------------------------------------------------------------------------

/// Waiter half: resolves with the watermark value that advanced past the
/// one observed when the future was requested.
#[derive(Debug)]
pub struct CompletionTimeFuture {
    shared: Arc<Shared>,
}

impl CompletionTimeFuture {
    /// Blocks until the watermark advances.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Shutdown`] when the service shut down first.
    pub fn wait(&self) -> Result<Time, WaitError> {
        let mut cell = self.shared.cell.lock();
        loop {
            match *cell {
                FutureCell::Resolved(gct) => return Ok(gct),
                FutureCell::Abandoned => return Err(WaitError::Shutdown),
                FutureCell::Pending => self.shared.cond.wait(&mut cell),
            }
        }
    }

    /// Blocks until the watermark advances or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::TimedOut`] when the timeout elapsed, or
    /// [`WaitError::Shutdown`] when the service shut down first.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Time, WaitError> {
        let deadline = std::time::Instant::now() + timeout;
        let mut cell = self.shared.cell.lock();
        loop {
            match *cell {
                FutureCell::Resolved(gct) => return Ok(gct),
                FutureCell::Abandoned => return Err(WaitError::Shutdown),
                FutureCell::Pending => {
                    if self.shared.cond.wait_until(&mut cell, deadline).timed_out() {
                        return match *cell {
                            FutureCell::Resolved(gct) => Ok(gct),
                            FutureCell::Abandoned => Err(WaitError::Shutdown),
                            FutureCell::Pending => Err(WaitError::TimedOut),
                        };
                    }
                }
            }
        }
    }

    /// Checks for resolution without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`TryWaitError::Pending`] while unresolved, or
    /// [`TryWaitError::Shutdown`] when the service shut down first.
    pub fn try_wait(&self) -> Result<Time, TryWaitError> {
        match *self.shared.cell.lock() {
            FutureCell::Resolved(gct) => Ok(gct),
            FutureCell::Abandoned => Err(TryWaitError::Shutdown),
            FutureCell::Pending => Err(TryWaitError::Pending),
        }
    }

    /// True once resolved (not abandoned).
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(*self.shared.cell.lock(), FutureCell::Resolved(_))
    }
}

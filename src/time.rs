//! Time values and time sources.
//!
//! All scheduling decisions in the driver compare [`Time`] values obtained
//! from a [`TimeSource`]. Production runs use [`WallClock`], a monotonic
//! clock anchored to the process start. Tests use [`VirtualClock`], which
//! only moves when told to, so scheduling behavior can be driven
//! deterministically.
//!
//! Operation timestamps (scheduled start, dependency time) and completion
//! watermarks share the same `Time` type, so "has the watermark reached this
//! operation's dependency time" is a plain comparison.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A point in time, in nanoseconds from an arbitrary epoch.
///
/// `Time` is totally ordered and cheap to copy. The epoch is whatever the
/// producing [`TimeSource`] anchors to; values from different sources must
/// not be compared.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Time(u64);

impl Time {
    /// The zero time (the epoch itself).
    pub const ZERO: Self = Self(0);

    /// The largest representable time.
    pub const MAX: Self = Self(u64::MAX);

    /// Creates a time from nanoseconds since the epoch.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Creates a time from microseconds since the epoch.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    /// Creates a time from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Creates a time from seconds since the epoch.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Nanoseconds since the epoch.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Whole milliseconds since the epoch (truncating).
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Adds a duration, saturating at [`Time::MAX`].
    #[must_use]
    pub fn saturating_add(self, d: Duration) -> Self {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }

    /// Subtracts a duration, saturating at [`Time::ZERO`].
    #[must_use]
    pub fn saturating_sub(self, d: Duration) -> Self {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_sub(nanos))
    }

    /// Duration from `earlier` to `self`, or [`Duration::ZERO`] if `earlier`
    /// is not earlier.
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

// ---------------------------------------------------------------------------
// TimeSource
// ---------------------------------------------------------------------------

/// A source of the current time.
///
/// Implementations must be monotonic: consecutive calls to `now()` never go
/// backwards. Shared across threads by `Arc`.
pub trait TimeSource: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Time;
}

// ---------------------------------------------------------------------------
// WallClock
// ---------------------------------------------------------------------------

/// Monotonic wall clock anchored to its construction instant.
///
/// `now()` reports nanoseconds elapsed since the clock was created, so a
/// fresh `WallClock` starts at [`Time::ZERO`]. Uses [`Instant`] internally
/// and is therefore immune to system clock adjustments.
#[derive(Debug)]
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    /// Creates a wall clock whose epoch is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Time {
        let elapsed = self.epoch.elapsed();
        Time::from_nanos(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }
}

// ---------------------------------------------------------------------------
// VirtualClock
// ---------------------------------------------------------------------------

/// Manually advanced clock for deterministic tests.
///
/// Starts at [`Time::ZERO`] (or a chosen start time) and only moves through
/// [`advance`](VirtualClock::advance), [`advance_to`](VirtualClock::advance_to)
/// or [`set`](VirtualClock::set). All methods are callable from any thread.
#[derive(Debug)]
pub struct VirtualClock {
    now: AtomicU64,
}

impl VirtualClock {
    /// Creates a virtual clock at [`Time::ZERO`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    /// Creates a virtual clock at the given start time.
    #[must_use]
    pub const fn starting_at(start: Time) -> Self {
        Self {
            now: AtomicU64::new(start.as_nanos()),
        }
    }

    /// Advances the clock by `nanos` nanoseconds.
    pub fn advance(&self, nanos: u64) {
        self.now.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Advances the clock to `target` if `target` is ahead; no-op otherwise.
    pub fn advance_to(&self, target: Time) {
        self.now.fetch_max(target.as_nanos(), Ordering::SeqCst);
    }

    /// Sets the clock to an absolute time. Unlike `advance_to` this can move
    /// the clock backwards; tests that need monotonicity should prefer
    /// `advance_to`.
    pub fn set(&self, time: Time) {
        self.now.store(time.as_nanos(), Ordering::SeqCst);
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Time {
        Time::from_nanos(self.now.load(Ordering::SeqCst))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

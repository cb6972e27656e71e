//! Gated scheduling.
//!
//! Operations do not execute when they arrive; they execute when they are
//! *due* and *allowed*. The [`Spinner`] waits out the scheduled start time,
//! then polls each [`SpinnerCheck`] gate until every one passes. The only
//! gate the core ships is [`DependencyTimeCheck`], which holds
//! dependency-tracked operations until the global completion time reaches
//! their dependency time.

mod check;
mod spinner;

pub use check::{CheckOutcome, DependencyTimeCheck, SpinnerCheck};
pub use spinner::{Spinner, SpinnerOutcome, DEFAULT_GRANULARITY};

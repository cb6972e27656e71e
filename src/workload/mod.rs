//! Operations and their classification.
//!
//! The driver core treats the workload as opaque: an operation is a typed,
//! timestamped unit with an optional payload the execution adapter knows how
//! to interpret. What the core does need to know per operation type, it
//! looks up in a [`ClassificationTable`] built once at startup.

mod classification;
mod operation;

pub use classification::{
    ClassificationTable, DependencyMode, OperationClassification, SchedulingMode,
};
pub use operation::{Operation, OperationType};

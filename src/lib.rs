//! Benchmark-execution driver core: completion-time coordination and
//! gated operation scheduling.
//!
//! A benchmark run replays a stream of timestamped operations against a
//! system under test while holding two guarantees at once: every
//! operation dispatches as close as possible to its scheduled time, and
//! an operation that depends on earlier work never executes before every
//! concurrent participant has certified that the dependency's deadline
//! has passed. The pivot between the two is the **global completion
//! time**: a monotonically non-decreasing watermark below which no peer,
//! local workers included, can still be initiating work.
//!
//! # Layout
//!
//! - [`coord`]: the watermark. Per-peer completion-time records, the
//!   service contract, and its two interchangeable implementations, one
//!   mutex-guarded and one queue-based.
//! - [`sched`]: wall-clock dispatch. The spinner that holds an operation
//!   until its scheduled time and polls its gates, and the dependency
//!   gate that reads the watermark.
//! - [`exec`]: execution. Dispatcher wiring, the per-operation handler
//!   state machine, the worker pool, and the [`Driver`] facade.
//! - [`workload`]: operations and their classification into dependency
//!   and scheduling modes.
//! - [`config`], [`metrics`], [`reporter`], [`time`], [`error`]: the
//!   ambient pieces every run threads through.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tideline::{
//!     BoxedExecutor, ClassificationTable, DependencyMode, Driver, DriverConfig,
//!     ExecutionAdapter, ExecutionError, Operation, OperationClassification,
//!     OperationType, SchedulingMode, Time,
//! };
//!
//! struct NoopAdapter;
//!
//! impl ExecutionAdapter for NoopAdapter {
//!     fn executor_for(&self, _operation: &Operation) -> Result<BoxedExecutor, ExecutionError> {
//!         Ok(Box::new(|_| Ok(())))
//!     }
//! }
//!
//! let classifications = ClassificationTable::from_entries([(
//!     OperationType::new(1),
//!     OperationClassification::new(DependencyMode::None, SchedulingMode::IndividualAsync),
//! )]);
//! let driver = Driver::new(DriverConfig::default(), classifications, Arc::new(NoopAdapter))?;
//! let operations =
//!     (0..4).map(|i| Operation::new(OperationType::new(1), Time::from_nanos(i), Time::ZERO));
//! let report = driver.run(operations)?;
//! assert_eq!(report.executed, 4);
//! assert!(report.is_success());
//! # Ok::<(), tideline::DriverError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod coord;
pub mod error;
pub mod exec;
pub mod metrics;
pub mod reporter;
pub mod sched;
pub mod time;
pub mod workload;

pub use config::DriverConfig;
pub use coord::{
    CompletionTimeService, CompletionTimeStrategy, GlobalCompletionTimeReader,
    LocalCompletionTimeWriter, PeerId, WriterId,
};
pub use error::{CoordinationError, DriverError, ExecutionError, WorkloadError};
pub use exec::{BoxedExecutor, Driver, ExecutionAdapter, RunReport};
pub use metrics::{InMemoryMetrics, MetricsSink, NullMetrics};
pub use reporter::ErrorReporter;
pub use time::{Time, TimeSource, VirtualClock, WallClock};
pub use workload::{
    ClassificationTable, DependencyMode, Operation, OperationClassification, OperationType,
    SchedulingMode,
};

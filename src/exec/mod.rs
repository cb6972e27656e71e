//! Operation execution: wiring, handlers, the worker pool, and the driver.
//!
//! The flow through this module mirrors the life of an operation. The
//! [`OperationDispatcher`] turns a classified operation into an
//! [`OperationHandler`] with the right completion-time writer and, for
//! dependency-tracked types, the watermark gate. The [`HandlerPool`] runs
//! handlers on worker threads, each driven through its phases by the
//! scheduler. [`Driver`] is the facade over the whole pipeline: one call
//! takes an operation stream and returns a [`RunReport`].
//!
//! What executing an operation *means* is not this crate's business: the
//! embedding supplies an [`ExecutionAdapter`] that produces an executor
//! per operation, and the handler invokes it between its gate checks and
//! its progress submission.

mod dispatcher;
mod driver;
mod handler;
mod pool;

pub use dispatcher::OperationDispatcher;
pub use driver::{Driver, RunReport};
pub use handler::{BoxedExecutor, HandlerOutcome, OperationHandler};
pub use pool::{HandlerPool, PoolStats};

use crate::error::ExecutionError;
use crate::workload::Operation;

/// Bridge to the system under test.
///
/// Called once per operation at wiring time, before the operation is
/// scheduled. The returned executor runs later, on a pool worker, when
/// the operation's scheduled time has arrived and its gates have passed.
pub trait ExecutionAdapter: Send + Sync {
    /// Produces the executor for one operation.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::NoExecutor`] when the adapter cannot
    /// execute this operation type; this aborts the run at wiring time.
    fn executor_for(&self, operation: &Operation) -> Result<BoxedExecutor, ExecutionError>;
}

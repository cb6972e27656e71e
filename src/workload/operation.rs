//! Operations as the driver core sees them.

use std::any::Any;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::time::Time;

/// Numeric identity of an operation type.
///
/// Workloads assign each kind of operation a stable code; the
/// classification table and the execution adapter are both keyed by it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OperationType(u32);

impl OperationType {
    /// Creates an operation type from its numeric code.
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    /// The numeric code.
    #[must_use]
    pub const fn code(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One timestamped unit of work from the operation stream.
///
/// `scheduled_start` is when the operation should be dispatched.
/// `dependency_time` is the watermark the global completion time must reach
/// before a dependency-tracked operation may execute; for independent
/// operations it is conventionally [`Time::ZERO`] and never consulted.
///
/// The payload is opaque to the core. Execution adapters downcast it to
/// whatever parameter type the workload produced.
#[derive(Clone)]
pub struct Operation {
    op_type: OperationType,
    scheduled_start: Time,
    dependency_time: Time,
    payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl Operation {
    /// Creates an operation without a payload.
    #[must_use]
    pub const fn new(op_type: OperationType, scheduled_start: Time, dependency_time: Time) -> Self {
        Self {
            op_type,
            scheduled_start,
            dependency_time,
            payload: None,
        }
    }

    /// Attaches a payload for the execution adapter.
    #[must_use]
    pub fn with_payload(mut self, payload: Arc<dyn Any + Send + Sync>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The operation's type code.
    #[must_use]
    pub const fn op_type(&self) -> OperationType {
        self.op_type
    }

    /// When this operation should be dispatched.
    #[must_use]
    pub const fn scheduled_start(&self) -> Time {
        self.scheduled_start
    }

    /// The watermark required before a dependency-tracked operation may run.
    #[must_use]
    pub const fn dependency_time(&self) -> Time {
        self.dependency_time
    }

    /// The opaque payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.payload.as_ref()
    }

    /// Downcasts the payload to a concrete parameter type.
    #[must_use]
    pub fn payload_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload
            .as_deref()
            .and_then(|payload| <dyn Any>::downcast_ref(payload))
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("op_type", &self.op_type)
            .field("scheduled_start", &self.scheduled_start)
            .field("dependency_time", &self.dependency_time)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_return_what_was_given() {
        let op = Operation::new(
            OperationType::new(3),
            Time::from_millis(100),
            Time::from_millis(40),
        );
        assert_eq!(op.op_type(), OperationType::new(3));
        assert_eq!(op.scheduled_start(), Time::from_millis(100));
        assert_eq!(op.dependency_time(), Time::from_millis(40));
        assert!(op.payload().is_none());
    }

    #[test]
    fn payload_downcasts_to_concrete_type() {
        let op = Operation::new(OperationType::new(1), Time::ZERO, Time::ZERO)
            .with_payload(Arc::new(42_u64));
        assert_eq!(op.payload_as::<u64>(), Some(&42));
        assert_eq!(op.payload_as::<String>(), None);
    }

    #[test]
    fn debug_does_not_dump_payload() {
        let op = Operation::new(OperationType::new(9), Time::ZERO, Time::ZERO)
            .with_payload(Arc::new("params".to_owned()));
        let text = format!("{op:?}");
        assert!(text.contains("has_payload: true"));
        assert!(!text.contains("params"));
    }
}

//! Operation classification: dependency mode and scheduling mode.
//!
//! Built once from configuration at startup and read-only afterwards. The
//! dispatcher consults it to pick a writer lane and decide whether to attach
//! the dependency gate; nothing else branches on operation type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::WorkloadError;
use crate::workload::OperationType;

/// Whether an operation's correctness depends on the global completion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyMode {
    /// Independent of all other operations; never gated.
    None,
    /// Reads state that prior operations produce; gated on the watermark.
    Read,
    /// Reads and writes dependency-tracked state; gated on the watermark.
    ReadWrite,
}

impl DependencyMode {
    /// True for modes that participate in completion-time tracking
    /// (`Read` and `ReadWrite`).
    #[must_use]
    pub const fn is_dependency_tracked(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Read => "read",
            Self::ReadWrite => "read_write",
        }
    }
}

impl std::fmt::Display for DependencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an operation is dispatched relative to its scheduled time.
///
/// Each mode is a separate dispatch lane with its own completion-time
/// writer, so lanes cannot reorder each other's submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulingMode {
    /// Dispatched one at a time; the lane waits for each operation.
    IndividualBlocking,
    /// Dispatched at its scheduled time without waiting for predecessors.
    IndividualAsync,
    /// Dispatched as part of a time window batch.
    Windowed,
}

impl SchedulingMode {
    /// Number of distinct scheduling modes.
    pub const COUNT: usize = 3;

    /// All modes, in lane order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::IndividualBlocking,
        Self::IndividualAsync,
        Self::Windowed,
    ];

    /// Stable index of this mode's writer lane.
    #[must_use]
    pub const fn lane_index(self) -> usize {
        match self {
            Self::IndividualBlocking => 0,
            Self::IndividualAsync => 1,
            Self::Windowed => 2,
        }
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IndividualBlocking => "individual_blocking",
            Self::IndividualAsync => "individual_async",
            Self::Windowed => "windowed",
        }
    }
}

impl std::fmt::Display for SchedulingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The behavior record for one operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationClassification {
    /// Dependency mode: does this type wait on the watermark.
    pub dependency: DependencyMode,
    /// Scheduling mode: which dispatch lane this type belongs to.
    pub scheduling: SchedulingMode,
}

impl OperationClassification {
    /// Creates a classification record.
    #[must_use]
    pub const fn new(dependency: DependencyMode, scheduling: SchedulingMode) -> Self {
        Self {
            dependency,
            scheduling,
        }
    }
}

/// Immutable operation-type to classification map.
///
/// Missing entries are a configuration error: [`require`] surfaces them as
/// [`WorkloadError::UnclassifiedOperation`], which aborts the run at first
/// use of the unknown type.
///
/// [`require`]: ClassificationTable::require
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationTable {
    entries: BTreeMap<OperationType, OperationClassification>,
}

impl ClassificationTable {
    /// Builds a table from `(type, classification)` pairs. Later duplicates
    /// replace earlier ones.
    #[must_use]
    pub fn from_entries(
        entries: impl IntoIterator<Item = (OperationType, OperationClassification)>,
    ) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Looks up a classification.
    #[must_use]
    pub fn get(&self, op_type: OperationType) -> Option<OperationClassification> {
        self.entries.get(&op_type).copied()
    }

    /// Looks up a classification, failing for unmapped types.
    ///
    /// # Errors
    ///
    /// Returns [`WorkloadError::UnclassifiedOperation`] when `op_type` has
    /// no entry.
    pub fn require(&self, op_type: OperationType) -> Result<OperationClassification, WorkloadError> {
        self.get(op_type)
            .ok_or(WorkloadError::UnclassifiedOperation { op_type })
    }

    /// Checks that every given type is classified. Startup validation for
    /// workloads that can enumerate their types up front.
    ///
    /// # Errors
    ///
    /// Returns the first [`WorkloadError::UnclassifiedOperation`] found.
    pub fn validate(
        &self,
        types: impl IntoIterator<Item = OperationType>,
    ) -> Result<(), WorkloadError> {
        for op_type in types {
            self.require(op_type)?;
        }
        Ok(())
    }

    /// Number of classified operation types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no types are classified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ClassificationTable {
        ClassificationTable::from_entries([
            (
                OperationType::new(1),
                OperationClassification::new(
                    DependencyMode::None,
                    SchedulingMode::IndividualAsync,
                ),
            ),
            (
                OperationType::new(2),
                OperationClassification::new(
                    DependencyMode::ReadWrite,
                    SchedulingMode::IndividualBlocking,
                ),
            ),
        ])
    }

    #[test]
    fn lookup_returns_the_record() {
        let table = table();
        let c = table.require(OperationType::new(2)).unwrap();
        assert_eq!(c.dependency, DependencyMode::ReadWrite);
        assert_eq!(c.scheduling, SchedulingMode::IndividualBlocking);
    }

    #[test]
    fn missing_type_is_a_configuration_error() {
        let table = table();
        let err = table.require(OperationType::new(99)).unwrap_err();
        assert_eq!(
            err,
            WorkloadError::UnclassifiedOperation {
                op_type: OperationType::new(99)
            }
        );
    }

    #[test]
    fn validate_covers_all_or_fails_fast() {
        let table = table();
        assert!(table
            .validate([OperationType::new(1), OperationType::new(2)])
            .is_ok());
        let err = table
            .validate([OperationType::new(1), OperationType::new(3)])
            .unwrap_err();
        assert!(matches!(err, WorkloadError::UnclassifiedOperation { op_type } if op_type == OperationType::new(3)));
    }

    #[test]
    fn dependency_tracking_covers_read_and_read_write() {
        assert!(!DependencyMode::None.is_dependency_tracked());
        assert!(DependencyMode::Read.is_dependency_tracked());
        assert!(DependencyMode::ReadWrite.is_dependency_tracked());
    }

    #[test]
    fn lane_indices_are_distinct_and_dense() {
        let mut seen = [false; SchedulingMode::COUNT];
        for mode in SchedulingMode::ALL {
            let lane = mode.lane_index();
            assert!(lane < SchedulingMode::COUNT);
            assert!(!seen[lane], "duplicate lane index for {mode}");
            seen[lane] = true;
        }
    }

    #[test]
    fn serde_keys_by_numeric_type() {
        let table = table();
        let json = serde_json::to_string(&table).unwrap();
        let back: ClassificationTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(OperationType::new(2)), table.get(OperationType::new(2)));
    }
}

//! Run results: one [`Attempt`] per processed spec, aggregated in a
//! [`Summary`].

use std::collections::HashMap;

use crate::error::RunError;

/// Outcome of a single lifecycle phase.
#[derive(Debug, Default)]
pub struct Phase {
    pub attempted: bool,
    pub succeeded: bool,
    pub error: Option<anyhow::Error>,
}

/// The outcome of processing a single resource within a run.
#[derive(Debug)]
pub struct Attempt {
    pub id: String,
    pub name: String,
    /// Rendered diff of pending changes (empty when none).
    pub changes: String,
    pub needs_apply: bool,
    pub evaluation_error: Option<anyhow::Error>,
    pub backup: Phase,
    pub apply: Phase,
    pub rollback: Phase,
    /// Set when the resource was skipped because an earlier one failed.
    pub skipped: bool,
}

impl Attempt {
    pub(crate) fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            changes: String::new(),
            needs_apply: false,
            evaluation_error: None,
            backup: Phase::default(),
            apply: Phase::default(),
            rollback: Phase::default(),
            skipped: false,
        }
    }

    pub fn applied(&self) -> bool {
        self.apply.succeeded
    }

    pub fn rolled_back(&self) -> bool {
        self.rollback.succeeded
    }

    /// The first error recorded on this attempt, in lifecycle order.
    pub fn error(&self) -> Option<&anyhow::Error> {
        self.evaluation_error
            .as_ref()
            .or(self.backup.error.as_ref())
            .or(self.apply.error.as_ref())
            .or(self.rollback.error.as_ref())
    }
}

/// Detailed report of a run. Created fresh per run and returned to the
/// caller; immutable afterwards.
#[derive(Debug, Default)]
pub struct Summary {
    pub success: bool,
    /// Set when the run as a whole failed before or outside per-resource
    /// processing (wiring, cycle, cancellation).
    pub fatal_error: Option<RunError>,
    /// Attempts keyed by resource id.
    pub attempts: HashMap<String, Attempt>,
    pub total_count: usize,
    pub applied_count: usize,
    pub skipped_count: usize,
    pub rollback_count: usize,
}

impl Summary {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

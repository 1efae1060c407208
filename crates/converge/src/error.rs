//! Error types for the converge crate

use thiserror::Error;

/// Errors raised by [`crate::Graph`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The graph cannot be topologically sorted because it contains a cycle.
    #[error("circular dependency found")]
    CircularDependency,

    /// A requested node does not exist in the graph.
    #[error("node {0:?} not found")]
    NodeNotFound(String),
}

/// Errors raised when registering a resource spec with the orchestrator.
#[derive(Debug, Error)]
pub enum AddError {
    #[error("resource id cannot be empty")]
    EmptyId,

    #[error("duplicate resource spec id: {0:?}")]
    DuplicateId(String),

    /// The resource rejected its own configuration.
    #[error("resource validation failed for {id:?}: {reason:#}")]
    Validation { id: String, reason: anyhow::Error },
}

/// Fatal-for-the-run errors. Everything else is recorded per attempt.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("resource {id:?} depends on unknown resource {dependency:?}")]
    UnknownDependency { id: String, dependency: String },

    #[error("failed wiring dependency from {from:?} to {to:?}: {source}")]
    Wiring {
        from: String,
        to: String,
        #[source]
        source: GraphError,
    },

    #[error("dependency resolution failed: {0}")]
    Sort(#[from] GraphError),

    #[error("run cancelled")]
    Cancelled,
}

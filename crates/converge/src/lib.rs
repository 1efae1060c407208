//! # Converge
//!
//! A framework for declarative resource convergence.
//!
//! The crate provides the building blocks a planner needs to take a set of
//! resource declarations and drive the managed system toward them:
//!
//! - **Resource**: the lifecycle protocol (`check` / `diff` / `apply` /
//!   `rollback`) every manageable entity implements, with optional
//!   validation and backup capabilities
//! - **Graph**: a directed dependency graph with cached topological ordering
//! - **Orchestrator**: registers resource specs, wires the graph and runs
//!   the lifecycle in dependency order with fail-fast, cascade skip and
//!   reverse-order rollback
//! - **Reporter**: a pluggable sink for lifecycle events
//! - **Summary**: the structured result of a run, one [`Attempt`] per spec
//!
//! The engine is transport-agnostic: resources own whatever client they need
//! to talk to the system under management. Cancellation threads through every
//! lifecycle call as a [`tokio_util::sync::CancellationToken`]; the run loop
//! observes it at resource boundaries and between rollback steps.

pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod report;
pub mod resource;
pub mod summary;

pub use error::{AddError, GraphError, RunError};
pub use graph::Graph;
pub use orchestrator::{Options, Orchestrator, ResourceSpec};
pub use report::{EmojiReporter, NullReporter, PlainReporter, Reporter};
pub use resource::{BoxedResource, Resource};
pub use summary::{Attempt, Phase, Summary};

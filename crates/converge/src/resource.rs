//! The resource lifecycle protocol.

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Core protocol for everything the orchestrator can manage.
///
/// A resource owns its observed state: `check` populates it, `apply` and
/// `rollback` consume it. Instances are therefore single-run; do not reuse a
/// resource across orchestrator runs.
///
/// The optional capabilities ship as provided methods. Overriding
/// [`Resource::validate`] opts into registration-time validation; overriding
/// [`Resource::supports_backup`] and [`Resource::backup`] opts into content
/// backup before apply.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Human-readable label, e.g. `file:/etc/foo` or `command:ls -la`.
    fn name(&self) -> String;

    /// Whether this resource can safely be processed in parallel with other
    /// resources. Advisory; the current run loop is sequential.
    fn is_concurrent(&self) -> bool;

    /// Static configuration validation, run once at registration.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Determines whether the resource needs to be applied by comparing the
    /// observed system state with the desired configuration. Side-effect-free
    /// on the managed system; records the observed state on the resource.
    async fn check(&mut self, cancel: &CancellationToken) -> Result<bool>;

    /// Renders a human-readable diff of pending changes. Meaningful after
    /// `check`; empty when there is nothing to change.
    async fn diff(&self, cancel: &CancellationToken) -> Result<String>;

    /// Transitions the resource to the desired state. Idempotent.
    async fn apply(&mut self, cancel: &CancellationToken) -> Result<()>;

    /// Whether this resource participates in content backup.
    fn supports_backup(&self) -> bool {
        false
    }

    /// Snapshots the current state if the pending apply needs one for
    /// rollback. Returns whether a backup artifact was actually created.
    async fn backup(&mut self, _cancel: &CancellationToken) -> Result<bool> {
        Ok(false)
    }

    /// Best-effort revert of the most recent `apply`.
    async fn rollback(&mut self, cancel: &CancellationToken) -> Result<()>;
}

pub type BoxedResource = Box<dyn Resource>;

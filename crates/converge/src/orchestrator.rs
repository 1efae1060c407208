//! The orchestration loop.
//!
//! Resources register as [`ResourceSpec`]s; `run` sorts the dependency
//! graph and drives each resource through evaluate → backup → apply,
//! failing fast, skipping everything downstream of the first failure and
//! rolling back applied work in reverse order.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::error::{AddError, RunError};
use crate::graph::Graph;
use crate::report::{EmojiReporter, Reporter};
use crate::resource::{BoxedResource, Resource};
use crate::summary::{Attempt, Summary};

/// A resource along with its unique identifier and dependencies.
pub struct ResourceSpec {
    pub id: String,
    pub resource: BoxedResource,
    /// Ids of specs that must be processed before this one.
    pub dependencies: Vec<String>,
}

pub struct Options {
    pub reporter: Box<dyn Reporter>,
    pub backup_enabled: bool,
    /// Reserved for a future parallel scheduler; the run loop is sequential.
    pub concurrency: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            reporter: Box::new(EmojiReporter),
            backup_enabled: false,
            concurrency: 1,
        }
    }
}

/// Coordinates evaluation, backup, apply and rollback of resources in
/// dependency order. Owns the spec registry and the graph for its lifetime.
pub struct Orchestrator {
    options: Options,
    specs: HashMap<String, ResourceSpec>,
    graph: Graph,
}

impl Orchestrator {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            specs: HashMap::new(),
            graph: Graph::new(),
        }
    }

    /// Registers a resource spec and its graph node.
    ///
    /// Rejects empty and duplicate ids, and runs the resource's own
    /// validation before accepting it.
    pub fn add(&mut self, spec: ResourceSpec) -> Result<(), AddError> {
        if spec.id.is_empty() {
            return Err(AddError::EmptyId);
        }
        if self.specs.contains_key(&spec.id) {
            return Err(AddError::DuplicateId(spec.id));
        }
        if let Err(reason) = spec.resource.validate() {
            return Err(AddError::Validation { id: spec.id, reason });
        }

        self.graph.add_node(spec.id.clone());
        self.specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Wires dependency edges into the graph. Every dependency must name a
    /// registered spec.
    fn initialize(&mut self) -> Result<(), RunError> {
        for (id, spec) in &self.specs {
            for dep in &spec.dependencies {
                if !self.specs.contains_key(dep) {
                    return Err(RunError::UnknownDependency {
                        id: id.clone(),
                        dependency: dep.clone(),
                    });
                }
                self.graph
                    .add_edge_checked(dep, &[id.as_str()])
                    .map_err(|source| RunError::Wiring {
                        from: dep.clone(),
                        to: id.clone(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    /// Executes the orchestration of all registered resources in dependency
    /// order.
    ///
    /// Per resource: evaluate (check + diff), then — unless `plan_only` or
    /// nothing to do — backup (when enabled and supported) and apply.
    /// Processing stops at the first failure; the remaining resources are
    /// marked skipped and every successfully applied resource is rolled back
    /// in reverse order. Cancellation is observed at resource boundaries and
    /// becomes the run's fatal error.
    pub async fn run(&mut self, cancel: &CancellationToken, plan_only: bool) -> Summary {
        let mut summary = Summary::new();

        if let Err(err) = self.initialize() {
            summary.fatal_error = Some(err);
            return summary;
        }

        let order = match self.graph.sort() {
            Ok(order) => order,
            Err(err) => {
                summary.fatal_error = Some(RunError::Sort(err));
                return summary;
            }
        };
        summary.total_count = order.len();
        log::debug!("run order: {order:?}");

        let mut failed = false;
        let mut rollback_needed = false;
        let mut applied: Vec<String> = Vec::with_capacity(order.len());

        for id in &order {
            if cancel.is_cancelled() {
                summary.fatal_error = Some(RunError::Cancelled);
                return summary;
            }

            let Some(spec) = self.specs.get_mut(id) else {
                continue;
            };
            let attempt = summary
                .attempts
                .entry(id.clone())
                .or_insert_with(|| Attempt::new(id.clone(), spec.resource.name()));

            if failed {
                self.options.reporter.skipped(&attempt.id, &attempt.name);
                attempt.skipped = true;
                summary.skipped_count += 1;
                continue;
            }

            if !evaluate(&self.options, attempt, spec.resource.as_mut(), cancel).await {
                failed = true;
                rollback_needed = true;
                continue;
            }

            if plan_only || !attempt.needs_apply {
                continue;
            }

            // A backup failure fails the run and cascades into skips, but
            // does not unwind earlier applies: the failed resource itself
            // was never touched.
            if !backup(&self.options, attempt, spec.resource.as_mut(), cancel).await {
                failed = true;
                continue;
            }

            if !apply(&self.options, attempt, spec.resource.as_mut(), cancel).await {
                failed = true;
                rollback_needed = true;
                continue;
            }

            applied.push(id.clone());
            summary.applied_count += 1;
        }

        if rollback_needed && !plan_only {
            summary.rollback_count = self
                .rollback_applied(cancel, &applied, &mut summary.attempts)
                .await;
        }

        summary.success = !failed;
        summary
    }

    /// Reverts applied resources in reverse apply order. A failing rollback
    /// is recorded on its attempt and does not stop the rest.
    async fn rollback_applied(
        &mut self,
        cancel: &CancellationToken,
        applied: &[String],
        attempts: &mut HashMap<String, Attempt>,
    ) -> usize {
        let mut count = 0;

        self.options.reporter.info("Starting rollback...");
        for (steps_done, id) in applied.iter().rev().enumerate() {
            if cancel.is_cancelled() {
                self.options.reporter.warn(&format!(
                    "Rollback interrupted by cancellation after {steps_done} steps"
                ));
                return count;
            }

            let (Some(spec), Some(attempt)) = (self.specs.get_mut(id), attempts.get_mut(id))
            else {
                continue;
            };

            self.options.reporter.rollback(&attempt.id, &attempt.name);
            attempt.rollback.attempted = true;
            match spec.resource.rollback(cancel).await {
                Ok(()) => {
                    attempt.rollback.succeeded = true;
                    count += 1;
                }
                Err(err) => {
                    let err = err.context("rollback failed");
                    self.options.reporter.fail(&attempt.id, &attempt.name, &err);
                    attempt.rollback.error = Some(err);
                }
            }
        }
        self.options.reporter.info("Rollback finished.");

        count
    }
}

/// Determines current state and renders the pending diff. Returns whether
/// the phase succeeded.
async fn evaluate(
    options: &Options,
    attempt: &mut Attempt,
    resource: &mut dyn Resource,
    cancel: &CancellationToken,
) -> bool {
    options.reporter.evaluate(&attempt.id, &attempt.name);

    attempt.needs_apply = match resource.check(cancel).await {
        Ok(needs_apply) => needs_apply,
        Err(err) => {
            options.reporter.fail(&attempt.id, &attempt.name, &err);
            attempt.evaluation_error = Some(err);
            return false;
        }
    };

    if attempt.needs_apply {
        attempt.changes = match resource.diff(cancel).await {
            Ok(diff) => diff,
            // A broken diff must not fail the run; surface it in the changes.
            Err(err) => format!("[diff unavailable: {err:#}]"),
        };
        options
            .reporter
            .diff(&attempt.id, &attempt.name, &attempt.changes);
    } else {
        options.reporter.no_changes(&attempt.id, &attempt.name);
    }

    true
}

/// Creates a backup when enabled and the resource supports it.
async fn backup(
    options: &Options,
    attempt: &mut Attempt,
    resource: &mut dyn Resource,
    cancel: &CancellationToken,
) -> bool {
    if !options.backup_enabled || !resource.supports_backup() {
        return true;
    }

    attempt.backup.attempted = true;
    match resource.backup(cancel).await {
        Ok(created) => {
            if created {
                options.reporter.backuped(&attempt.id, &attempt.name);
                attempt.backup.succeeded = true;
            }
            true
        }
        Err(err) => {
            let err = err.context("backup failed");
            options.reporter.fail(&attempt.id, &attempt.name, &err);
            attempt.backup.error = Some(err);
            false
        }
    }
}

/// Applies the resource.
async fn apply(
    options: &Options,
    attempt: &mut Attempt,
    resource: &mut dyn Resource,
    cancel: &CancellationToken,
) -> bool {
    options.reporter.apply(&attempt.id, &attempt.name);

    attempt.apply.attempted = true;
    match resource.apply(cancel).await {
        Ok(()) => {
            attempt.apply.succeeded = true;
            options.reporter.success(&attempt.id, &attempt.name);
            true
        }
        Err(err) => {
            options.reporter.fail(&attempt.id, &attempt.name, &err);
            attempt.apply.error = Some(err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::report::NullReporter;
    use anyhow::{Result, anyhow, bail};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type CallLog = Arc<Mutex<Vec<String>>>;

    /// Scripted resource: records lifecycle calls and fails on demand.
    struct Scripted {
        id: String,
        log: CallLog,
        needs_apply: bool,
        valid: bool,
        fail_check: bool,
        fail_apply: bool,
        fail_backup: bool,
        fail_rollback: bool,
        backs_up: bool,
        /// Cancelled by `apply`, to simulate an interrupt mid-run.
        cancel_on_apply: Option<CancellationToken>,
    }

    impl Scripted {
        fn new(id: &str, log: &CallLog) -> Self {
            Self {
                id: id.to_string(),
                log: Arc::clone(log),
                needs_apply: true,
                valid: true,
                fail_check: false,
                fail_apply: false,
                fail_backup: false,
                fail_rollback: false,
                backs_up: false,
                cancel_on_apply: None,
            }
        }

        fn record(&self, call: &str) {
            self.log.lock().unwrap().push(format!("{call}:{}", self.id));
        }
    }

    #[async_trait]
    impl Resource for Scripted {
        fn name(&self) -> String {
            format!("scripted:{}", self.id)
        }

        fn is_concurrent(&self) -> bool {
            false
        }

        fn validate(&self) -> Result<()> {
            if self.valid {
                Ok(())
            } else {
                bail!("invalid configuration")
            }
        }

        async fn check(&mut self, _cancel: &CancellationToken) -> Result<bool> {
            self.record("check");
            if self.fail_check {
                bail!("check blew up");
            }
            Ok(self.needs_apply)
        }

        async fn diff(&self, _cancel: &CancellationToken) -> Result<String> {
            Ok(format!("+ {}", self.id))
        }

        async fn apply(&mut self, _cancel: &CancellationToken) -> Result<()> {
            self.record("apply");
            if let Some(token) = &self.cancel_on_apply {
                token.cancel();
            }
            if self.fail_apply {
                bail!("apply blew up");
            }
            Ok(())
        }

        fn supports_backup(&self) -> bool {
            self.backs_up
        }

        async fn backup(&mut self, _cancel: &CancellationToken) -> Result<bool> {
            self.record("backup");
            if self.fail_backup {
                bail!("backup blew up");
            }
            Ok(true)
        }

        async fn rollback(&mut self, _cancel: &CancellationToken) -> Result<()> {
            self.record("rollback");
            if self.fail_rollback {
                bail!("rollback blew up");
            }
            Ok(())
        }
    }

    fn quiet() -> Options {
        Options {
            reporter: Box::new(NullReporter),
            ..Options::default()
        }
    }

    fn spec(resource: Scripted, deps: &[&str]) -> ResourceSpec {
        ResourceSpec {
            id: resource.id.clone(),
            resource: Box::new(resource),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn calls(log: &CallLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn add_rejects_empty_and_duplicate_ids() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());

        assert!(matches!(
            o.add(spec(Scripted::new("", &log), &[])),
            Err(AddError::EmptyId)
        ));

        o.add(spec(Scripted::new("a", &log), &[])).unwrap();
        assert!(matches!(
            o.add(spec(Scripted::new("a", &log), &[])),
            Err(AddError::DuplicateId(id)) if id == "a"
        ));
    }

    #[test]
    fn add_runs_resource_validation() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());

        let mut broken = Scripted::new("a", &log);
        broken.valid = false;
        assert!(matches!(
            o.add(spec(broken, &[])),
            Err(AddError::Validation { id, .. }) if id == "a"
        ));
        assert!(o.is_empty());
    }

    #[tokio::test]
    async fn applies_in_dependency_order() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        // Registered out of order on purpose.
        o.add(spec(Scripted::new("c", &log), &["b"])).unwrap();
        o.add(spec(Scripted::new("a", &log), &[])).unwrap();
        o.add(spec(Scripted::new("b", &log), &["a"])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;

        assert!(summary.success);
        assert_eq!(summary.total_count, 3);
        assert_eq!(summary.applied_count, 3);
        assert_eq!(summary.skipped_count, 0);
        assert_eq!(
            calls(&log),
            vec!["check:a", "apply:a", "check:b", "apply:b", "check:c", "apply:c"]
        );
    }

    #[tokio::test]
    async fn cycle_fails_without_execution() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        o.add(spec(Scripted::new("a", &log), &["b"])).unwrap();
        o.add(spec(Scripted::new("b", &log), &["a"])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;

        assert!(!summary.success);
        assert!(matches!(
            summary.fatal_error,
            Some(RunError::Sort(GraphError::CircularDependency))
        ));
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn unknown_dependency_fails_without_execution() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        o.add(spec(Scripted::new("a", &log), &["ghost"])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;

        assert!(!summary.success);
        assert!(matches!(
            summary.fatal_error,
            Some(RunError::UnknownDependency { ref dependency, .. }) if dependency == "ghost"
        ));
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn apply_failure_rolls_back_in_reverse_order() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        o.add(spec(Scripted::new("a", &log), &[])).unwrap();
        o.add(spec(Scripted::new("b", &log), &["a"])).unwrap();
        let mut c = Scripted::new("c", &log);
        c.fail_apply = true;
        o.add(spec(c, &["b"])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;

        assert!(!summary.success);
        assert_eq!(summary.applied_count, 2);
        assert_eq!(summary.rollback_count, 2);
        assert!(summary.attempts["c"].apply.error.is_some());
        assert!(summary.attempts["b"].rolled_back());
        assert!(summary.attempts["a"].rolled_back());
        assert_eq!(
            calls(&log),
            vec![
                "check:a",
                "apply:a",
                "check:b",
                "apply:b",
                "check:c",
                "apply:c",
                "rollback:b",
                "rollback:a"
            ]
        );
    }

    #[tokio::test]
    async fn check_failure_cascades_into_skips() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        o.add(spec(Scripted::new("a", &log), &[])).unwrap();
        let mut b = Scripted::new("b", &log);
        b.fail_check = true;
        o.add(spec(b, &["a"])).unwrap();
        o.add(spec(Scripted::new("c", &log), &["b"])).unwrap();
        o.add(spec(Scripted::new("d", &log), &["c"])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;

        assert!(!summary.success);
        assert_eq!(summary.applied_count, 1);
        assert_eq!(summary.skipped_count, 2);
        assert!(summary.attempts["b"].evaluation_error.is_some());
        assert!(summary.attempts["c"].skipped);
        assert!(summary.attempts["d"].skipped);
        // Only `a` was applied, so only `a` rolls back.
        assert_eq!(summary.rollback_count, 1);
        assert_eq!(
            calls(&log),
            vec!["check:a", "apply:a", "check:b", "rollback:a"]
        );
    }

    #[tokio::test]
    async fn backup_failure_skips_but_leaves_applied_work_standing() {
        let log = CallLog::default();
        let mut options = quiet();
        options.backup_enabled = true;
        let mut o = Orchestrator::new(options);

        let mut a = Scripted::new("a", &log);
        a.backs_up = true;
        o.add(spec(a, &[])).unwrap();
        let mut b = Scripted::new("b", &log);
        b.backs_up = true;
        b.fail_backup = true;
        o.add(spec(b, &["a"])).unwrap();
        o.add(spec(Scripted::new("c", &log), &["b"])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;

        assert!(!summary.success);
        assert!(summary.attempts["a"].backup.succeeded);
        assert!(summary.attempts["b"].backup.attempted);
        assert!(summary.attempts["b"].backup.error.is_some());
        assert!(!summary.attempts["b"].apply.attempted);
        assert!(summary.attempts["c"].skipped);
        // The failed backup cascades into skips, but `a` stays applied:
        // only evaluation and apply failures unwind prior work.
        assert_eq!(summary.rollback_count, 0);
        assert!(!summary.attempts["a"].rollback.attempted);
        assert_eq!(
            calls(&log),
            vec!["check:a", "backup:a", "apply:a", "check:b", "backup:b"]
        );
    }

    #[tokio::test]
    async fn backup_not_attempted_when_disabled_or_unsupported() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        let mut a = Scripted::new("a", &log);
        a.backs_up = true;
        o.add(spec(a, &[])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;
        assert!(!summary.attempts["a"].backup.attempted);

        let log = CallLog::default();
        let mut options = quiet();
        options.backup_enabled = true;
        let mut o = Orchestrator::new(options);
        o.add(spec(Scripted::new("plain", &log), &[])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;
        assert!(!summary.attempts["plain"].backup.attempted);
        assert_eq!(calls(&log), vec!["check:plain", "apply:plain"]);
    }

    #[tokio::test]
    async fn plan_only_never_applies() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        o.add(spec(Scripted::new("a", &log), &[])).unwrap();
        let mut b = Scripted::new("b", &log);
        b.fail_check = true;
        o.add(spec(b, &["a"])).unwrap();

        let summary = o.run(&CancellationToken::new(), true).await;

        assert!(!summary.success);
        assert_eq!(summary.applied_count, 0);
        assert_eq!(summary.attempts["a"].changes, "+ a");
        assert!(summary.attempts["a"].needs_apply);
        // Plan mode never applies, so there is nothing to roll back.
        assert_eq!(summary.rollback_count, 0);
        assert_eq!(calls(&log), vec!["check:a", "check:b"]);
    }

    #[tokio::test]
    async fn plan_only_with_clean_run_succeeds() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        o.add(spec(Scripted::new("a", &log), &[])).unwrap();
        o.add(spec(Scripted::new("b", &log), &["a"])).unwrap();

        let summary = o.run(&CancellationToken::new(), true).await;

        assert!(summary.success);
        assert_eq!(summary.applied_count, 0);
        assert!(
            summary
                .attempts
                .values()
                .all(|a| a.needs_apply && !a.changes.is_empty())
        );
        assert_eq!(calls(&log), vec!["check:a", "check:b"]);
    }

    #[tokio::test]
    async fn resources_without_drift_are_left_alone() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        let mut a = Scripted::new("a", &log);
        a.needs_apply = false;
        o.add(spec(a, &[])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;

        assert!(summary.success);
        assert_eq!(summary.applied_count, 0);
        assert!(!summary.attempts["a"].needs_apply);
        assert!(summary.attempts["a"].changes.is_empty());
        assert_eq!(calls(&log), vec!["check:a"]);
    }

    #[tokio::test]
    async fn cancellation_before_processing_is_fatal() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        o.add(spec(Scripted::new("a", &log), &[])).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = o.run(&cancel, false).await;

        assert!(!summary.success);
        assert!(matches!(summary.fatal_error, Some(RunError::Cancelled)));
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_rollback() {
        let log = CallLog::default();
        let cancel = CancellationToken::new();
        let mut o = Orchestrator::new(quiet());
        o.add(spec(Scripted::new("a", &log), &[])).unwrap();
        // `b` cancels the run while failing, as an interrupt would.
        let mut b = Scripted::new("b", &log);
        b.fail_apply = true;
        b.cancel_on_apply = Some(cancel.clone());
        o.add(spec(b, &["a"])).unwrap();

        let summary = o.run(&cancel, false).await;

        assert!(!summary.success);
        assert_eq!(summary.applied_count, 1);
        assert_eq!(summary.rollback_count, 0);
        assert!(!summary.attempts["a"].rollback.attempted);
        assert_eq!(
            calls(&log),
            vec!["check:a", "apply:a", "check:b", "apply:b"]
        );
    }

    #[tokio::test]
    async fn rollback_failure_does_not_stop_other_rollbacks() {
        let log = CallLog::default();
        let mut o = Orchestrator::new(quiet());
        let mut a = Scripted::new("a", &log);
        a.fail_rollback = true;
        o.add(spec(a, &[])).unwrap();
        o.add(spec(Scripted::new("b", &log), &["a"])).unwrap();
        let mut c = Scripted::new("c", &log);
        c.fail_apply = true;
        o.add(spec(c, &["b"])).unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;

        assert_eq!(summary.rollback_count, 1);
        assert!(summary.attempts["a"].rollback.attempted);
        assert!(summary.attempts["a"].rollback.error.is_some());
        assert!(summary.attempts["b"].rolled_back());
    }

    #[tokio::test]
    async fn diff_failure_is_embedded_in_changes() {
        struct BrokenDiff;

        #[async_trait]
        impl Resource for BrokenDiff {
            fn name(&self) -> String {
                "broken-diff".into()
            }
            fn is_concurrent(&self) -> bool {
                false
            }
            async fn check(&mut self, _cancel: &CancellationToken) -> Result<bool> {
                Ok(true)
            }
            async fn diff(&self, _cancel: &CancellationToken) -> Result<String> {
                Err(anyhow!("no diff for you"))
            }
            async fn apply(&mut self, _cancel: &CancellationToken) -> Result<()> {
                Ok(())
            }
            async fn rollback(&mut self, _cancel: &CancellationToken) -> Result<()> {
                Ok(())
            }
        }

        let mut o = Orchestrator::new(quiet());
        o.add(ResourceSpec {
            id: "a".into(),
            resource: Box::new(BrokenDiff),
            dependencies: vec![],
        })
        .unwrap();

        let summary = o.run(&CancellationToken::new(), false).await;

        assert!(summary.success);
        assert!(summary.attempts["a"].changes.contains("diff unavailable"));
        assert!(summary.attempts["a"].changes.contains("no diff for you"));
    }
}

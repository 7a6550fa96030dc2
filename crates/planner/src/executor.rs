//! Execution engine - applies a reconcile plan with bounded parallelism
//!
//! Each [`BranchChange`] is an independent unit. Units run on a rayon pool,
//! a failing unit never stops the others, and every failure is collected.

use crate::context::{BranchOutcome, ProgressCallback, ReconcileContext};
use crate::diff::{BranchChange, DerivedObject, Operation, ReconcilePlan, Step};
use crate::error::{ApplyFailure, ApplyFailures, StoreError};
use crate::store::ObjectStore;
use crate::types::{GitRepository, Kind, Terraform};
use rayon::prelude::*;
use serde::Serialize;

/// Counts of applied steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Units with a failed step
    pub failed: usize,
}

impl ApplySummary {
    /// Total number of store mutations made
    pub fn total_changes(&self) -> usize {
        self.created + self.updated + self.deleted
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn merge(&mut self, other: &ApplySummary) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }

    fn add_step(&mut self, operation: Operation) {
        match operation {
            Operation::Create => self.created += 1,
            Operation::Update => self.updated += 1,
            Operation::Delete => self.deleted += 1,
        }
    }
}

/// Result of applying a plan
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub summary: ApplySummary,
    pub failures: ApplyFailures,
}

struct UnitResult {
    summary: ApplySummary,
    failure: Option<ApplyFailure>,
}

/// Apply every change in `plan`.
///
/// Within a unit, steps run in order and the first failure ends the unit.
/// Units themselves run up to `ctx.jobs` at a time.
pub fn apply_plan<S, P>(
    store: &S,
    plan: &ReconcilePlan,
    ctx: &ReconcileContext,
    progress: &mut P,
) -> ApplyReport
where
    S: ObjectStore,
    P: ProgressCallback,
{
    if plan.is_empty() {
        return ApplyReport::default();
    }

    progress.on_apply_start(plan.changes.len());
    let results = if ctx.jobs == 1 || plan.changes.len() == 1 {
        plan.changes
            .iter()
            .map(|change| apply_unit(store, change, ctx))
            .collect()
    } else {
        apply_parallel(store, &plan.changes, ctx)
    };

    let mut report = ApplyReport::default();
    for (change, result) in plan.changes.iter().zip(results) {
        report.summary.merge(&result.summary);
        let outcome = match &result.failure {
            Some(failure) => BranchOutcome::Failed(&failure.error),
            None => BranchOutcome::Applied,
        };
        progress.on_unit_complete(change, &outcome);
        if let Some(failure) = result.failure {
            report.summary.failed += 1;
            report.failures.0.push(failure);
        }
    }
    progress.on_apply_complete();

    report
}

/// Apply units in parallel using rayon, keeping plan order in the results
fn apply_parallel<S: ObjectStore>(
    store: &S,
    changes: &[BranchChange],
    ctx: &ReconcileContext,
) -> Vec<UnitResult> {
    match rayon::ThreadPoolBuilder::new().num_threads(ctx.jobs).build() {
        Ok(pool) => pool.install(|| {
            changes
                .par_iter()
                .map(|change| apply_unit(store, change, ctx))
                .collect()
        }),
        Err(e) => {
            log::warn!("Failed to create apply thread pool, applying sequentially: {e}");
            changes
                .iter()
                .map(|change| apply_unit(store, change, ctx))
                .collect()
        }
    }
}

fn apply_unit<S: ObjectStore>(
    store: &S,
    change: &BranchChange,
    ctx: &ReconcileContext,
) -> UnitResult {
    let mut summary = ApplySummary::default();
    for step in &change.steps {
        let result = if ctx.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            apply_step(store, step)
        };

        match result {
            Ok(()) => {
                log::debug!(
                    "{}: {} {} {}",
                    change.label(),
                    step.operation(),
                    step.kind(),
                    step.name()
                );
                summary.add_step(step.operation());
            }
            Err(error) => {
                log::warn!(
                    "{}: {} {} {} failed: {}",
                    change.label(),
                    step.operation(),
                    step.kind(),
                    step.name(),
                    error
                );
                let failure = ApplyFailure {
                    branch_id: change.branch_id.clone(),
                    operation: step.operation(),
                    kind: step.kind(),
                    name: step.name().to_string(),
                    error,
                };
                return UnitResult {
                    summary,
                    failure: Some(failure),
                };
            }
        }
    }

    UnitResult {
        summary,
        failure: None,
    }
}

fn apply_step<S: ObjectStore>(store: &S, step: &Step) -> Result<(), StoreError> {
    match step {
        Step::Create(DerivedObject::Terraform(o)) => store.create(o).map(drop),
        Step::Create(DerivedObject::GitRepository(o)) => store.create(o).map(drop),
        Step::Update {
            updated: DerivedObject::Terraform(o),
            ..
        } => store.update(o).map(drop),
        Step::Update {
            updated: DerivedObject::GitRepository(o),
            ..
        } => store.update(o).map(drop),
        Step::Delete {
            kind,
            namespace,
            name,
        } => {
            let result = match kind {
                Kind::Terraform => store.delete::<Terraform>(namespace, name),
                Kind::GitRepository => store.delete::<GitRepository>(namespace, name),
            };
            match result {
                Err(e) if e.is_not_found() => {
                    log::debug!("{kind} {namespace}/{name} already gone");
                    Ok(())
                }
                other => other,
            }
        }
    }
}

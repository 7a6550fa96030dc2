//! The reconcile pass: derive, list, diff, apply.

use crate::context::{NoProgress, ProgressCallback, ReconcileContext};
use crate::derive::{derive, derived_name};
use crate::diff::{Operation, ReconcilePlan, compute_plan};
use crate::error::{ApplyFailure, ReconcileError, Result, StoreError};
use crate::executor::{ApplyReport, ApplySummary, apply_plan};
use crate::owned::{OwnedObjects, list_owned};
use crate::provider::{PullRequest, PullRequestProvider, Repository};
use crate::resolve::{ReferencePolicy, get_source, get_template};
use crate::store::ObjectStore;
use crate::types::{GitRepository, Kind, Object, Terraform};

/// Keeps branch objects in line with open pull requests.
///
/// Holds no state between calls: every pass gets the template, its source
/// and the full list of open pull requests, and re-derives everything.
/// Passes are idempotent, so a failed pass is retried by calling again.
#[derive(Debug)]
pub struct Reconciler<S> {
    store: S,
    policy: ReferencePolicy,
}

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            policy: ReferencePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Look up a template and the source it references
    pub fn resolve(&self, namespace: &str, name: &str) -> Result<(Terraform, GitRepository)> {
        let template = get_template(&self.store, namespace, name)?;
        let source = get_source(&self.store, &template, self.policy)?;
        Ok((template, source))
    }

    /// Branch objects currently owned by `template`
    pub fn owned(&self, template: &Terraform, source: &GitRepository) -> Result<OwnedObjects> {
        Ok(list_owned(&self.store, template, source)?)
    }

    /// Compute what a pass would change, without changing anything
    pub fn plan(
        &self,
        template: &Terraform,
        source: &GitRepository,
        pull_requests: &[PullRequest],
    ) -> Result<ReconcilePlan> {
        let desired = derive(template, source, pull_requests)?;
        let actual = list_owned(&self.store, template, source)?;
        let plan = compute_plan(&desired, &actual);
        log::debug!(
            "{}: {} desired branches, {} owned objects, {} changes",
            template.key(),
            desired.len(),
            actual.object_count(),
            plan.changes.len()
        );
        Ok(plan)
    }

    /// Run one pass for `template`.
    pub fn reconcile(
        &self,
        ctx: &ReconcileContext,
        template: &Terraform,
        source: &GitRepository,
        pull_requests: &[PullRequest],
    ) -> Result<ApplySummary> {
        self.reconcile_with_progress(ctx, template, source, pull_requests, &mut NoProgress)
    }

    /// Run one pass, reporting each branch unit to `progress`.
    ///
    /// Fails without touching the store when the source tracks no branch or
    /// owned objects can't be listed. Otherwise every unit is attempted and
    /// all unit failures come back together as [`ReconcileError::Apply`],
    /// along with one failure per pull request whose derived names are not
    /// valid object names.
    pub fn reconcile_with_progress<P: ProgressCallback>(
        &self,
        ctx: &ReconcileContext,
        template: &Terraform,
        source: &GitRepository,
        pull_requests: &[PullRequest],
        progress: &mut P,
    ) -> Result<ApplySummary> {
        if ctx.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let plan = self.plan(template, source, pull_requests)?;
        let mut report = apply_plan(&self.store, &plan, ctx, progress);
        add_skipped(&mut report, template, &plan);

        if report.summary.total_changes() == 0 && report.failures.is_empty() {
            log::info!("{}: branch objects up to date", template.key());
        } else {
            log::info!(
                "{}: {} created, {} updated, {} deleted, {} failed",
                template.key(),
                report.summary.created,
                report.summary.updated,
                report.summary.deleted,
                report.summary.failed
            );
        }

        if report.failures.is_empty() {
            Ok(report.summary)
        } else {
            Err(ReconcileError::Apply(report.failures))
        }
    }

    /// Resolve a template, ask `provider` for its open pull requests and
    /// run one pass.
    ///
    /// The repository is worked out from the source URL.
    pub fn poll<P: PullRequestProvider, C: ProgressCallback>(
        &self,
        ctx: &ReconcileContext,
        namespace: &str,
        name: &str,
        provider: &P,
        progress: &mut C,
    ) -> Result<ApplySummary> {
        let (template, source) = self.resolve(namespace, name)?;
        let repository = Repository::from_url(&source.spec.url)
            .ok_or_else(|| ReconcileError::InvalidRepositoryUrl(source.spec.url.clone()))?;
        let pull_requests = provider.list_pull_requests(&repository)?;
        log::debug!(
            "{} open pull requests for {}",
            pull_requests.len(),
            repository
        );
        self.reconcile_with_progress(ctx, &template, &source, &pull_requests, progress)
    }
}

/// Count pull requests that could not be mirrored as failed branches.
///
/// They never reach the store, so the cause is recorded as an invalid
/// object. Failures stay in branch order, strays last.
fn add_skipped(report: &mut ApplyReport, template: &Terraform, plan: &ReconcilePlan) {
    if plan.skipped.is_empty() {
        return;
    }

    report.summary.failed += plan.skipped.len();
    report
        .failures
        .0
        .extend(plan.skipped.iter().map(|(branch_id, reason)| ApplyFailure {
            branch_id: Some(branch_id.clone()),
            operation: Operation::Create,
            kind: Kind::Terraform,
            name: derived_name(template.name(), branch_id),
            error: StoreError::Invalid {
                message: reason.clone(),
            },
        }));
    report
        .failures
        .0
        .sort_by_key(|f| (f.branch_id.is_none(), f.branch_id.clone()));
}

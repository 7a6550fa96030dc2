//! Diff computation between desired and stored branch objects

use crate::derive::DesiredState;
use crate::owned::{ActualPair, OwnedObjects};
use crate::provider::BranchId;
use crate::types::{
    GitRepository, GitRepositorySpec, Kind, Object, ObjectMeta, Terraform, TerraformSpec,
};
use serde::Serialize;
use std::fmt;

/// What a step does to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Fields the planner owns on a derived object
///
/// The whole spec is re-derived on every pass. Labels are owned for the
/// keys the derivation produces and for inherited keys recorded on an
/// earlier pass, which are removed once the template or source drops them.
/// Other labels, `status` and store metadata belong to someone else.
pub trait OwnedFields: Object {
    type Spec: Clone + PartialEq + fmt::Debug;

    fn spec(&self) -> &Self::Spec;

    fn spec_mut(&mut self) -> &mut Self::Spec;

    /// Whether `self` (stored) differs from `desired` in owned fields
    fn differs_from(&self, desired: &Self) -> bool {
        let current = self.metadata();
        let wanted = desired.metadata();
        self.spec() != desired.spec()
            || wanted
                .labels
                .iter()
                .any(|(k, v)| current.labels.get(k) != Some(v))
            || wanted
                .annotations
                .iter()
                .any(|(k, v)| current.annotations.get(k) != Some(v))
            || !dropped_labels(current, wanted).is_empty()
    }

    /// `self` with the owned fields of `desired` written over it
    fn with_owned_fields_of(&self, desired: &Self) -> Self {
        let wanted = desired.metadata();
        let dropped = dropped_labels(self.metadata(), wanted);

        let mut updated = self.clone();
        *updated.spec_mut() = desired.spec().clone();
        let metadata = updated.metadata_mut();
        for key in &dropped {
            metadata.labels.remove(key);
        }
        metadata
            .labels
            .extend(wanted.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        metadata
            .annotations
            .extend(wanted.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        updated
    }
}

/// Previously inherited label keys still present on `current` that
/// `desired` no longer carries
fn dropped_labels(current: &ObjectMeta, desired: &ObjectMeta) -> Vec<String> {
    current
        .inherited_label_keys()
        .filter(|key| current.labels.contains_key(*key) && !desired.labels.contains_key(*key))
        .map(str::to_string)
        .collect()
}

impl OwnedFields for Terraform {
    type Spec = TerraformSpec;

    fn spec(&self) -> &TerraformSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut TerraformSpec {
        &mut self.spec
    }
}

impl OwnedFields for GitRepository {
    type Spec = GitRepositorySpec;

    fn spec(&self) -> &GitRepositorySpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut GitRepositorySpec {
        &mut self.spec
    }
}

/// A derived object of either kind
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedObject {
    Terraform(Terraform),
    GitRepository(GitRepository),
}

impl DerivedObject {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Terraform(_) => Kind::Terraform,
            Self::GitRepository(_) => Kind::GitRepository,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Terraform(o) => o.name(),
            Self::GitRepository(o) => o.name(),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Terraform(o) => o.namespace(),
            Self::GitRepository(o) => o.namespace(),
        }
    }

    /// JSON rendering, used for showing changes
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::Terraform(o) => serde_json::to_value(o),
            Self::GitRepository(o) => serde_json::to_value(o),
        }
    }
}

impl From<Terraform> for DerivedObject {
    fn from(o: Terraform) -> Self {
        Self::Terraform(o)
    }
}

impl From<GitRepository> for DerivedObject {
    fn from(o: GitRepository) -> Self {
        Self::GitRepository(o)
    }
}

/// One store operation
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Create(DerivedObject),
    /// `updated` is `current` with the owned fields replaced
    Update {
        current: DerivedObject,
        updated: DerivedObject,
    },
    Delete {
        kind: Kind,
        namespace: String,
        name: String,
    },
}

impl Step {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Create(_) => Operation::Create,
            Self::Update { .. } => Operation::Update,
            Self::Delete { .. } => Operation::Delete,
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::Create(o) | Self::Update { updated: o, .. } => o.kind(),
            Self::Delete { kind, .. } => *kind,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Create(o) | Self::Update { updated: o, .. } => o.name(),
            Self::Delete { name, .. } => name,
        }
    }

    fn delete<T: Object>(object: &T) -> Self {
        Self::Delete {
            kind: T::KIND,
            namespace: object.namespace().to_string(),
            name: object.name().to_string(),
        }
    }
}

/// The steps for one branch, in the order they must run
///
/// Owned objects that map onto no branch get a change of their own with no
/// branch id.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchChange {
    pub branch_id: Option<BranchId>,
    pub steps: Vec<Step>,
}

impl BranchChange {
    /// Label used in logs and output
    pub fn label(&self) -> String {
        match &self.branch_id {
            Some(id) => id.to_string(),
            None => format!("stray {}", self.steps.first().map_or("", Step::name)),
        }
    }
}

/// Full change set for one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Branches needing at least one step, ordered by branch id, strays last
    pub changes: Vec<BranchChange>,
    /// Desired branches already up to date
    pub unchanged: Vec<BranchId>,
    /// Pull requests that could not be mirrored
    pub skipped: Vec<(BranchId, String)>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.changes.iter().flat_map(|c| c.steps.iter())
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_plan(self)
    }
}

/// Compute the steps that turn `actual` into `desired`.
///
/// Creates and updates touch the source before the Terraform object that
/// references it; deletes go the other way round.
pub fn compute_plan(desired: &DesiredState, actual: &OwnedObjects) -> ReconcilePlan {
    let mut plan = ReconcilePlan {
        skipped: desired.skipped.clone(),
        ..Default::default()
    };

    for (branch_id, pair) in &desired.pairs {
        let current = actual.get(branch_id).cloned().unwrap_or_default();
        let steps: Vec<Step> = [
            converge(current.source, &pair.source),
            converge(current.terraform, &pair.terraform),
        ]
        .into_iter()
        .flatten()
        .collect();

        if steps.is_empty() {
            plan.unchanged.push(branch_id.clone());
        } else {
            plan.changes.push(BranchChange {
                branch_id: Some(branch_id.clone()),
                steps,
            });
        }
    }

    for (branch_id, pair) in &actual.pairs {
        if desired.pairs.contains_key(branch_id) {
            continue;
        }
        let ActualPair { terraform, source } = pair;
        let steps: Vec<Step> = terraform
            .iter()
            .map(Step::delete)
            .chain(source.iter().map(Step::delete))
            .collect();
        plan.changes.push(BranchChange {
            branch_id: Some(branch_id.clone()),
            steps,
        });
    }
    plan.changes.sort_by(|a, b| a.branch_id.cmp(&b.branch_id));

    for stray in &actual.strays {
        plan.changes.push(BranchChange {
            branch_id: None,
            steps: vec![Step::Delete {
                kind: stray.kind,
                namespace: stray.namespace.clone(),
                name: stray.name.clone(),
            }],
        });
    }

    plan
}

fn converge<T>(current: Option<T>, desired: &T) -> Option<Step>
where
    T: OwnedFields + Into<DerivedObject>,
{
    match current {
        None => Some(Step::Create(desired.clone().into())),
        Some(current) if current.differs_from(desired) => {
            let updated = current.with_owned_fields_of(desired);
            Some(Step::Update {
                current: current.into(),
                updated: updated.into(),
            })
        }
        Some(_) => None,
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    /// Branches with at least one step
    pub branches: usize,
}

impl DiffSummary {
    pub fn from_plan(plan: &ReconcilePlan) -> Self {
        let mut summary = Self {
            branches: plan.changes.len(),
            ..Default::default()
        };
        for step in plan.steps() {
            match step.operation() {
                Operation::Create => summary.creates += 1,
                Operation::Update => summary.updates += 1,
                Operation::Delete => summary.deletes += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.creates + self.updates + self.deletes
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::derive;
    use crate::owned::Stray;
    use crate::provider::{PullRequest, Repository};
    use crate::types::{GitRepositorySpec, SourceReference};

    fn template() -> Terraform {
        Terraform::new(
            ObjectMeta::new("ns", "app").with_label("team", "a"),
            TerraformSpec::new(SourceReference::git_repository("src")),
        )
    }

    fn source() -> GitRepository {
        GitRepository::new(
            ObjectMeta::new("ns", "src"),
            GitRepositorySpec::new("https://example.com/repo", "main"),
        )
    }

    fn pr(number: u64, head: &str) -> PullRequest {
        PullRequest {
            repository: Repository::default(),
            number,
            base_branch: "main".into(),
            head_branch: head.into(),
        }
    }

    /// Owned objects as they would look after a clean create
    fn stored(desired: &DesiredState) -> OwnedObjects {
        let mut owned = OwnedObjects::default();
        for (id, pair) in &desired.pairs {
            let mut tf = pair.terraform.clone();
            tf.metadata.resource_version = Some("1".into());
            let mut src = pair.source.clone();
            src.metadata.resource_version = Some("2".into());
            owned.pairs.insert(
                id.clone(),
                ActualPair {
                    terraform: Some(tf),
                    source: Some(src),
                },
            );
        }
        owned
    }

    #[test]
    fn test_creates_source_before_terraform() {
        let desired = derive(&template(), &source(), &[pr(1, "a")]).unwrap();
        let plan = compute_plan(&desired, &OwnedObjects::default());

        assert_eq!(plan.changes.len(), 1);
        let kinds: Vec<Kind> = plan.changes[0].steps.iter().map(Step::kind).collect();
        assert_eq!(kinds, vec![Kind::GitRepository, Kind::Terraform]);
        assert!(
            plan.steps()
                .all(|s| s.operation() == Operation::Create)
        );
        assert_eq!(plan.summary().creates, 2);
    }

    #[test]
    fn test_in_sync_is_empty() {
        let desired = derive(&template(), &source(), &[pr(1, "a"), pr(2, "b")]).unwrap();
        let plan = compute_plan(&desired, &stored(&desired));
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged.len(), 2);
        assert!(!plan.summary().has_changes());
    }

    #[test]
    fn test_missing_half_is_created() {
        let desired = derive(&template(), &source(), &[pr(1, "a")]).unwrap();
        let mut actual = stored(&desired);
        for pair in actual.pairs.values_mut() {
            pair.terraform = None;
        }
        let plan = compute_plan(&desired, &actual);
        let steps: Vec<_> = plan.steps().collect();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].operation(), Operation::Create);
        assert_eq!(steps[0].kind(), Kind::Terraform);
    }

    #[test]
    fn test_update_keeps_foreign_fields() {
        let desired = derive(&template(), &source(), &[pr(1, "a")]).unwrap();
        let mut actual = stored(&desired);
        let id = BranchId::new("a", 1);
        {
            let tf = actual.pairs.get_mut(&id).unwrap().terraform.as_mut().unwrap();
            tf.spec.plan_only = false;
            tf.metadata
                .labels
                .insert("added-by-someone".into(), "yes".into());
            tf.status = Some(serde_json::json!({ "ready": true }));
        }

        let plan = compute_plan(&desired, &actual);
        let steps: Vec<_> = plan.steps().collect();
        assert_eq!(steps.len(), 1);
        let Step::Update { updated, .. } = steps[0] else {
            panic!("expected update, got {:?}", steps[0]);
        };
        let DerivedObject::Terraform(tf) = updated else {
            panic!("expected Terraform");
        };
        assert!(tf.spec.plan_only);
        assert_eq!(tf.metadata.labels["added-by-someone"], "yes");
        assert_eq!(tf.metadata.labels["team"], "a");
        assert_eq!(tf.metadata.resource_version.as_deref(), Some("1"));
        assert_eq!(tf.status, Some(serde_json::json!({ "ready": true })));
    }

    #[test]
    fn test_label_removed_from_template_is_dropped() {
        let previous = derive(&template(), &source(), &[pr(1, "a")]).unwrap();
        let mut actual = stored(&previous);
        let id = BranchId::new("a", 1);
        actual
            .pairs
            .get_mut(&id)
            .unwrap()
            .terraform
            .as_mut()
            .unwrap()
            .metadata
            .labels
            .insert("added-by-someone".into(), "yes".into());

        let mut template = template();
        template.metadata.labels.remove("team");
        let desired = derive(&template, &source(), &[pr(1, "a")]).unwrap();
        let plan = compute_plan(&desired, &actual);

        let steps: Vec<_> = plan.steps().collect();
        assert_eq!(steps.len(), 1);
        let Step::Update {
            updated: DerivedObject::Terraform(tf),
            ..
        } = steps[0]
        else {
            panic!("expected Terraform update, got {:?}", steps[0]);
        };
        assert!(!tf.metadata.labels.contains_key("team"));
        assert_eq!(tf.metadata.labels["added-by-someone"], "yes");
        assert_eq!(tf.metadata.inherited_label_keys().count(), 0);
        assert!(!tf.differs_from(&desired.get(&id).unwrap().terraform));
    }

    #[test]
    fn test_extra_labels_alone_do_not_trigger_update() {
        let desired = derive(&template(), &source(), &[pr(1, "a")]).unwrap();
        let mut actual = stored(&desired);
        for pair in actual.pairs.values_mut() {
            pair.source
                .as_mut()
                .unwrap()
                .metadata
                .labels
                .insert("extra".into(), "1".into());
        }
        assert!(compute_plan(&desired, &actual).is_empty());
    }

    #[test]
    fn test_deletes_terraform_before_source() {
        let previous = derive(&template(), &source(), &[pr(1, "a"), pr(2, "b")]).unwrap();
        let desired = derive(&template(), &source(), &[pr(2, "b")]).unwrap();
        let plan = compute_plan(&desired, &stored(&previous));

        assert_eq!(plan.changes.len(), 1);
        let change = &plan.changes[0];
        assert_eq!(change.branch_id, Some(BranchId::new("a", 1)));
        let steps: Vec<(Operation, Kind)> = change
            .steps
            .iter()
            .map(|s| (s.operation(), s.kind()))
            .collect();
        assert_eq!(
            steps,
            vec![
                (Operation::Delete, Kind::Terraform),
                (Operation::Delete, Kind::GitRepository)
            ]
        );
        assert_eq!(plan.unchanged, vec![BranchId::new("b", 2)]);
    }

    #[test]
    fn test_strays_deleted_last() {
        let desired = derive(&template(), &source(), &[pr(1, "a")]).unwrap();
        let mut actual = OwnedObjects::default();
        actual.strays.push(Stray {
            kind: Kind::GitRepository,
            namespace: "ns".into(),
            name: "old-src-a-1".into(),
        });

        let plan = compute_plan(&desired, &actual);
        assert_eq!(plan.changes.len(), 2);
        let last = plan.changes.last().unwrap();
        assert_eq!(last.branch_id, None);
        assert_eq!(last.label(), "stray old-src-a-1");
        assert_eq!(last.steps[0].operation(), Operation::Delete);
    }
}

//! Desired-state derivation
//!
//! Computes, from a template, its source and the open pull requests, the
//! exact set of branch objects that should exist. Pure: no store access and
//! no state, the same inputs always give the same output.

use crate::error::ReconcileError;
use crate::provider::{BranchId, PullRequest};
use crate::types::{
    GitRepository, GitRepositoryRef, INHERITED_LABELS_ANNOTATION, Labels, OWNER_LABEL, Object,
    ObjectMeta, PR_ID_LABEL, READABLE_PLAN_HUMAN, SourceReference, TEMPLATE_LABEL, Terraform,
};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Longest name the object store accepts
const MAX_NAME_LEN: usize = 253;

/// DNS-1123 subdomain
static NAME_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("Invalid object name regex")
});

/// The two objects that should exist for one pull request
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredPair {
    pub branch_id: BranchId,
    pub pull_request: PullRequest,
    pub terraform: Terraform,
    pub source: GitRepository,
}

/// Output of [`derive`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredState {
    /// Pairs keyed (and ordered) by branch id
    pub pairs: BTreeMap<BranchId, DesiredPair>,
    /// Pull requests that target the tracked branch but can't be mirrored,
    /// with the reason
    pub skipped: Vec<(BranchId, String)>,
}

impl DesiredState {
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, branch_id: &BranchId) -> Option<&DesiredPair> {
        self.pairs.get(branch_id)
    }
}

/// `<base>-<branchId>`
pub fn derived_name(base: &str, branch_id: &BranchId) -> String {
    format!("{base}-{branch_id}")
}

/// Whether `name` is acceptable as an object name
pub fn is_valid_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LEN && NAME_REGEX.is_match(name)
}

/// Labels every derived object carries on top of the inherited ones
pub fn owner_labels(template_name: &str, number: u64) -> Labels {
    [
        (OWNER_LABEL.to_string(), "true".to_string()),
        (PR_ID_LABEL.to_string(), number.to_string()),
        (TEMPLATE_LABEL.to_string(), template_name.to_string()),
    ]
    .into_iter()
    .collect()
}

/// Metadata of a derived object: inherited labels, owner labels on top, and
/// the list of inherited keys
fn derived_metadata(
    template: &Terraform,
    name: String,
    inherited: &Labels,
    number: u64,
) -> ObjectMeta {
    let owner = owner_labels(template.name(), number);
    let inherited_keys: Vec<&str> = inherited
        .keys()
        .filter(|key| !owner.contains_key(*key))
        .map(String::as_str)
        .collect();

    let mut metadata = ObjectMeta::new(template.namespace(), name);
    metadata.labels = inherited.clone();
    metadata.labels.extend(owner);
    metadata.annotations.insert(
        INHERITED_LABELS_ANNOTATION.to_string(),
        inherited_keys.join(","),
    );
    metadata
}

/// Compute the desired branch objects.
///
/// Only pull requests whose base branch is the branch `source` tracks are
/// mirrored. Requests producing the same branch id collapse into one pair.
pub fn derive(
    template: &Terraform,
    source: &GitRepository,
    pull_requests: &[PullRequest],
) -> Result<DesiredState, ReconcileError> {
    let tracked = source
        .tracked_branch()
        .ok_or_else(|| ReconcileError::UntrackedSource {
            namespace: source.namespace().to_string(),
            name: source.name().to_string(),
        })?;

    let mut state = DesiredState::default();
    for pr in pull_requests {
        if pr.base_branch != tracked {
            log::debug!(
                "Ignoring pull request #{} ({} -> {}): not targeting {}",
                pr.number,
                pr.head_branch,
                pr.base_branch,
                tracked
            );
            continue;
        }

        let branch_id = pr.branch_id();
        let tf_name = derived_name(template.name(), &branch_id);
        let source_name = derived_name(source.name(), &branch_id);
        if let Some(bad) = [&tf_name, &source_name]
            .into_iter()
            .find(|n| !is_valid_name(n))
        {
            let reason = format!("derived name {bad:?} is not a valid object name");
            log::warn!("Skipping pull request #{}: {}", pr.number, reason);
            state.skipped.push((branch_id, reason));
            continue;
        }

        let pair = DesiredPair {
            terraform: derive_terraform(template, &source_name, tf_name, pr),
            source: derive_source(source, template, source_name, pr),
            branch_id: branch_id.clone(),
            pull_request: pr.clone(),
        };
        state.pairs.insert(branch_id, pair);
    }

    Ok(state)
}

/// Branch copy of the template
///
/// Overrides `sourceRef`, `planOnly`, `storeReadablePlan` and the outputs
/// secret name. Every other spec field is copied as is.
fn derive_terraform(
    template: &Terraform,
    source_name: &str,
    name: String,
    pr: &PullRequest,
) -> Terraform {
    let branch_id = pr.branch_id();
    let mut spec = template.spec.clone();
    spec.source_ref = SourceReference {
        kind: template.spec.source_ref.kind.clone(),
        name: source_name.to_string(),
        namespace: Some(template.namespace().to_string()),
    };
    spec.plan_only = true;
    spec.store_readable_plan = Some(READABLE_PLAN_HUMAN.to_string());
    if let Some(secret) = spec.write_outputs_to_secret.as_mut() {
        secret.name = derived_name(&secret.name, &branch_id);
    }

    let metadata = derived_metadata(template, name, template.labels(), pr.number);
    Terraform::new(metadata, spec)
}

/// Branch copy of the source, following the pull request's head branch.
/// Always lives next to the template.
fn derive_source(
    source: &GitRepository,
    template: &Terraform,
    name: String,
    pr: &PullRequest,
) -> GitRepository {
    let mut spec = source.spec.clone();
    spec.reference
        .get_or_insert_with(GitRepositoryRef::default)
        .branch = Some(pr.head_branch.clone());

    let metadata = derived_metadata(template, name, source.labels(), pr.number);
    GitRepository::new(metadata, spec)
}

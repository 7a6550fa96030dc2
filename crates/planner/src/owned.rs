//! Actual-state listing
//!
//! Finds the branch objects a template created earlier. Ownership is decided
//! by labels only: the owner marker plus the exact template name. Names are
//! used afterwards to recover the branch id, never to decide ownership.

use crate::error::StoreError;
use crate::provider::BranchId;
use crate::store::{LabelSelector, ObjectStore};
use crate::types::{
    GitRepository, Kind, OWNER_LABEL, Object, PR_ID_LABEL, TEMPLATE_LABEL, Terraform,
};
use std::collections::BTreeMap;

/// Selects every object derived from the named template
pub fn owner_selector(template_name: &str) -> LabelSelector {
    LabelSelector::everything()
        .with(OWNER_LABEL, "true")
        .with(TEMPLATE_LABEL, template_name)
}

/// The stored objects of one branch; either may be missing after a
/// partially failed pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActualPair {
    pub terraform: Option<Terraform>,
    pub source: Option<GitRepository>,
}

/// An owned object that no longer maps onto a branch id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stray {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
}

/// Output of [`list_owned`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnedObjects {
    pub pairs: BTreeMap<BranchId, ActualPair>,
    pub strays: Vec<Stray>,
}

impl OwnedObjects {
    pub fn get(&self, branch_id: &BranchId) -> Option<&ActualPair> {
        self.pairs.get(branch_id)
    }

    /// Number of owned objects found, strays included
    pub fn object_count(&self) -> usize {
        let paired: usize = self
            .pairs
            .values()
            .map(|p| usize::from(p.terraform.is_some()) + usize::from(p.source.is_some()))
            .sum();
        paired + self.strays.len()
    }
}

/// List the objects derived from `template`.
///
/// Derived objects live in the template's namespace. A derived Terraform
/// object is expected to be named `<template>-<branchId>` and a derived
/// source `<source>-<branchId>`, with the branch id ending in the `pr-id`
/// label. Owned objects that don't fit, for example sources derived from a
/// source the template no longer references, come back as strays.
///
/// The template and its source are never listed, whatever their labels say.
pub fn list_owned<S: ObjectStore>(
    store: &S,
    template: &Terraform,
    source: &GitRepository,
) -> Result<OwnedObjects, StoreError> {
    let namespace = template.namespace();
    let selector = owner_selector(template.name());

    let terraforms: Vec<Terraform> = store.list(namespace, &selector)?;
    let sources: Vec<GitRepository> = store.list(namespace, &selector)?;
    log::debug!(
        "Found {} owned Terraform and {} owned GitRepository objects in {} ({})",
        terraforms.len(),
        sources.len(),
        namespace,
        selector
    );

    let mut owned = OwnedObjects::default();
    for tf in terraforms {
        if same_object(&tf, template) {
            log::warn!(
                "Template {} carries the owner labels of its own branch objects; ignoring them",
                tf.key()
            );
            continue;
        }
        match branch_id_of(&tf, template.name()) {
            Some(id) => owned.pairs.entry(id).or_default().terraform = Some(tf),
            None => owned.strays.push(stray(&tf)),
        }
    }
    for src in sources {
        if same_object(&src, source) {
            log::warn!(
                "Source {} carries the owner labels of {}; ignoring them",
                src.key(),
                template.key()
            );
            continue;
        }
        match branch_id_of(&src, source.name()) {
            Some(id) => owned.pairs.entry(id).or_default().source = Some(src),
            None => owned.strays.push(stray(&src)),
        }
    }
    owned.strays.sort();

    Ok(owned)
}

fn same_object<T: Object>(a: &T, b: &T) -> bool {
    a.namespace() == b.namespace() && a.name() == b.name()
}

fn branch_id_of<T: Object>(object: &T, base: &str) -> Option<BranchId> {
    let pr_id = object.labels().get(PR_ID_LABEL)?;
    BranchId::from_derived_name(object.name(), base, pr_id)
}

fn stray<T: Object>(object: &T) -> Stray {
    log::debug!(
        "{} {} is owned but matches no branch",
        T::KIND,
        object.key()
    );
    Stray {
        kind: T::KIND,
        namespace: object.namespace().to_string(),
        name: object.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::owner_labels;
    use crate::store::MemoryStore;
    use crate::types::{GitRepositorySpec, ObjectMeta, SourceReference, TerraformSpec};

    fn template(name: &str) -> Terraform {
        Terraform::new(
            ObjectMeta::new("ns", name),
            TerraformSpec::new(SourceReference::git_repository("src")),
        )
    }

    fn source() -> GitRepository {
        GitRepository::new(
            ObjectMeta::new("ns", "src"),
            GitRepositorySpec::new("https://example.com/repo", "main"),
        )
    }

    fn owned_tf(template: &str, name: &str, number: u64) -> Terraform {
        let mut meta = ObjectMeta::new("ns", name);
        meta.labels = owner_labels(template, number);
        Terraform::new(
            meta,
            TerraformSpec::new(SourceReference::git_repository("src")),
        )
    }

    fn owned_src(template: &str, name: &str, number: u64) -> GitRepository {
        let mut meta = ObjectMeta::new("ns", name);
        meta.labels = owner_labels(template, number);
        GitRepository::new(meta, GitRepositorySpec::new("https://example.com/repo", "x"))
    }

    #[test]
    fn test_pairs_by_branch_id() {
        let store = MemoryStore::new();
        store.create(&owned_tf("app", "app-feature-1", 1)).unwrap();
        store.create(&owned_src("app", "src-feature-1", 1)).unwrap();
        store.create(&owned_tf("app", "app-other-2", 2)).unwrap();

        let owned = list_owned(&store, &template("app"), &source()).unwrap();
        assert_eq!(owned.pairs.len(), 2);
        assert!(owned.strays.is_empty());

        let feature = owned.get(&BranchId::new("feature", 1)).unwrap();
        assert!(feature.terraform.is_some());
        assert!(feature.source.is_some());

        let other = owned.get(&BranchId::new("other", 2)).unwrap();
        assert!(other.terraform.is_some());
        assert!(other.source.is_none());
        assert_eq!(owned.object_count(), 3);
    }

    #[test]
    fn test_ignores_unowned_and_other_templates() {
        let store = MemoryStore::new();
        // Template itself and a hand-made object with a derived-looking name
        store.create(&template("app")).unwrap();
        store
            .create(&Terraform::new(
                ObjectMeta::new("ns", "app-manual-1").with_label(PR_ID_LABEL, "1"),
                TerraformSpec::new(SourceReference::git_repository("src")),
            ))
            .unwrap();
        // Template "app-v2" shares the "app-" prefix
        store.create(&owned_tf("app-v2", "app-v2-feature-1", 1)).unwrap();

        let owned = list_owned(&store, &template("app"), &source()).unwrap();
        assert!(owned.pairs.is_empty());
        assert!(owned.strays.is_empty());
    }

    #[test]
    fn test_strays() {
        let store = MemoryStore::new();
        // Derived from a source the template used to reference
        store.create(&owned_src("app", "old-src-feature-1", 1)).unwrap();
        // pr-id label disagrees with the name
        store.create(&owned_tf("app", "app-feature-1", 9)).unwrap();

        let owned = list_owned(&store, &template("app"), &source()).unwrap();
        assert!(owned.pairs.is_empty());
        assert_eq!(
            owned.strays,
            vec![
                Stray {
                    kind: Kind::Terraform,
                    namespace: "ns".into(),
                    name: "app-feature-1".into(),
                },
                Stray {
                    kind: Kind::GitRepository,
                    namespace: "ns".into(),
                    name: "old-src-feature-1".into(),
                },
            ]
        );
    }

    #[test]
    fn test_template_and_source_never_listed() {
        let store = MemoryStore::new();
        let mut template = template("app");
        template.metadata.labels = owner_labels("app", 1);
        store.create(&template).unwrap();
        let mut source = source();
        source.metadata.labels = owner_labels("app", 1);
        store.create(&source).unwrap();
        store.create(&owned_tf("app", "app-feature-1", 1)).unwrap();

        let owned = list_owned(&store, &template, &source).unwrap();
        assert!(owned.strays.is_empty());
        assert_eq!(owned.object_count(), 1);
        assert!(owned.get(&BranchId::new("feature", 1)).is_some());
    }

    #[test]
    fn test_other_namespace_not_listed() {
        let store = MemoryStore::new();
        let mut tf = owned_tf("app", "app-feature-1", 1);
        tf.metadata.namespace = "other".into();
        store.create(&tf).unwrap();

        let owned = list_owned(&store, &template("app"), &source()).unwrap();
        assert_eq!(owned.object_count(), 0);
    }
}

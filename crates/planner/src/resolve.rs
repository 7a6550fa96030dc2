//! Template and source lookup

use crate::error::{ReconcileError, StoreError};
use crate::store::ObjectStore;
use crate::types::{GIT_REPOSITORY_KIND, GitRepository, Object, Terraform};

/// Rules for following a template's source reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferencePolicy {
    /// Refuse sources outside the template's namespace
    pub no_cross_namespace_refs: bool,
}

fn missing(error: StoreError) -> ReconcileError {
    match error {
        StoreError::NotFound {
            kind,
            namespace,
            name,
        } => ReconcileError::NotFound {
            kind,
            namespace,
            name,
        },
        other => ReconcileError::Store(other),
    }
}

/// Fetch the template Terraform object
pub fn get_template<S: ObjectStore>(
    store: &S,
    namespace: &str,
    name: &str,
) -> Result<Terraform, ReconcileError> {
    store.get(namespace, name).map_err(missing)
}

/// Fetch the source a template references.
///
/// Only `GitRepository` sources are supported. The namespace defaults to the
/// template's own.
pub fn get_source<S: ObjectStore>(
    store: &S,
    template: &Terraform,
    policy: ReferencePolicy,
) -> Result<GitRepository, ReconcileError> {
    let source_ref = &template.spec.source_ref;
    if source_ref.kind != GIT_REPOSITORY_KIND {
        return Err(ReconcileError::UnsupportedKind(source_ref.kind.clone()));
    }

    let namespace = source_ref
        .explicit_namespace()
        .unwrap_or(template.namespace());
    if policy.no_cross_namespace_refs && namespace != template.namespace() {
        return Err(ReconcileError::AccessDenied {
            kind: source_ref.kind.clone(),
            namespace: namespace.to_string(),
            name: source_ref.name.clone(),
        });
    }

    store.get(namespace, &source_ref.name).map_err(missing)
}

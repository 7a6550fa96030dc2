//! Object model for branch-based planning
//!
//! Two object kinds are managed: `Terraform` (the planning configuration) and
//! `GitRepository` (the versioned source it consumes). Specs keep the fields
//! derivation controls as typed fields and everything else in a pass-through
//! map that is copied verbatim onto derived objects.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Marks objects created by the branch planner
pub const OWNER_LABEL: &str = "infra.weave.works/branch-based-planner";

/// Pull request number a derived object was created for
pub const PR_ID_LABEL: &str = "infra.weave.works/pr-id";

/// Name of the template a derived object belongs to
pub const TEMPLATE_LABEL: &str = "infra.weave.works/branch-planner-template";

/// Comma-separated keys of the labels a derived object copied from its
/// template or source, so keys later removed there are removed here too
pub const INHERITED_LABELS_ANNOTATION: &str =
    "infra.weave.works/branch-planner-inherited-labels";

/// The only source kind the planner can mirror
pub const GIT_REPOSITORY_KIND: &str = "GitRepository";

/// Readable plan format forced on derived planning objects
pub const READABLE_PLAN_HUMAN: &str = "human";

/// Object labels, ordered so serialized objects are stable
pub type Labels = BTreeMap<String, String>;

/// Kinds of objects the store handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Terraform,
    GitRepository,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terraform => "Terraform",
            Self::GitRepository => GIT_REPOSITORY_KIND,
        }
    }

    /// Lower-case plural, used for storage paths
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Terraform => "terraforms",
            Self::GitRepository => "gitrepositories",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity, labels and store-assigned metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Labels,
    /// Optimistic concurrency token, assigned by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    /// Assigned by the store on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Label keys recorded under [`INHERITED_LABELS_ANNOTATION`]
    pub fn inherited_label_keys(&self) -> impl Iterator<Item = &str> {
        self.annotations
            .get(INHERITED_LABELS_ANNOTATION)
            .into_iter()
            .flat_map(|keys| keys.split(','))
            .filter(|key| !key.is_empty())
    }
}

/// An object the store can persist
pub trait Object: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync {
    const KIND: Kind;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn namespace(&self) -> &str {
        &self.metadata().namespace
    }

    fn labels(&self) -> &Labels {
        &self.metadata().labels
    }

    /// `namespace/name`
    fn key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }
}

// ============================================================================
// Terraform
// ============================================================================

/// A planning configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Terraform {
    pub metadata: ObjectMeta,
    pub spec: TerraformSpec,
    /// Written by whatever runs the plans; never derived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

impl Terraform {
    pub fn new(metadata: ObjectMeta, spec: TerraformSpec) -> Self {
        Self {
            metadata,
            spec,
            status: None,
        }
    }
}

impl Object for Terraform {
    const KIND: Kind = Kind::Terraform;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerraformSpec {
    pub source_ref: SourceReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_outputs_to_secret: Option<WriteOutputsToSecret>,
    #[serde(default)]
    pub plan_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_readable_plan: Option<String>,
    /// Fields derivation never touches
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

impl TerraformSpec {
    pub fn new(source_ref: SourceReference) -> Self {
        Self {
            source_ref,
            ..Default::default()
        }
    }
}

/// Reference from a Terraform object to its source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SourceReference {
    pub fn git_repository(name: impl Into<String>) -> Self {
        Self {
            kind: GIT_REPOSITORY_KIND.to_string(),
            name: name.into(),
            namespace: None,
        }
    }

    /// The explicit namespace, if one is set and non-empty
    pub fn explicit_namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutputsToSecret {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
}

// ============================================================================
// GitRepository
// ============================================================================

/// A repository checked out at a branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitRepository {
    pub metadata: ObjectMeta,
    pub spec: GitRepositorySpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

impl GitRepository {
    pub fn new(metadata: ObjectMeta, spec: GitRepositorySpec) -> Self {
        Self {
            metadata,
            spec,
            status: None,
        }
    }

    /// Branch this source follows, if any
    pub fn tracked_branch(&self) -> Option<&str> {
        self.spec
            .reference
            .as_ref()
            .and_then(|r| r.branch.as_deref())
            .filter(|b| !b.is_empty())
    }
}

impl Object for GitRepository {
    const KIND: Kind = Kind::GitRepository;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitRepositorySpec {
    pub url: String,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<GitRepositoryRef>,
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

impl GitRepositorySpec {
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reference: Some(GitRepositoryRef {
                branch: Some(branch.into()),
                passthrough: Map::new(),
            }),
            passthrough: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitRepositoryRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// tag, semver, commit and friends
    #[serde(flatten)]
    pub passthrough: Map<String, Value>,
}

//! Error types for branch planning.
//!
//! Store errors are categorized so callers can tell retryable failures
//! (conflicts, transient store trouble) from configuration problems that
//! will fail again until someone changes an object.

use crate::diff::Operation;
use crate::provider::BranchId;
use crate::types::Kind;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Categories of errors for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Object does not exist
    NotFound,
    /// Object already exists
    AlreadyExists,
    /// Concurrent modification
    Conflict,
    /// Connectivity, throttling and similar
    Transient,
    /// Policy forbids the access
    AccessDenied,
    /// Template or source is set up in a way the planner can't handle
    Configuration,
    /// Stopped before the operation was issued
    Cancelled,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether re-invoking reconcile may succeed without anyone changing
    /// an object.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::Transient | Self::Cancelled)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Object not found",
            Self::AlreadyExists => "Object already exists",
            Self::Conflict => "Concurrent modification",
            Self::Transient => "Temporary store failure",
            Self::AccessDenied => "Access denied",
            Self::Configuration => "Configuration error",
            Self::Cancelled => "Cancelled",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors returned by an object store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: Kind,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: Kind,
        namespace: String,
        name: String,
    },

    /// Stale resource version or a racing writer
    #[error("conflict on {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: Kind,
        namespace: String,
        name: String,
        message: String,
    },

    #[error("store unavailable: {message}")]
    Transient { message: String },

    #[error("invalid object: {message}")]
    Invalid { message: String },

    #[error("operation cancelled before it was issued")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(kind: Kind, namespace: &str, name: &str) -> Self {
        Self::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn already_exists(kind: Kind, namespace: &str, name: &str) -> Self {
        Self::AlreadyExists {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn conflict(kind: Kind, namespace: &str, name: &str, message: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::Invalid { .. } => ErrorCategory::Configuration,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Io(_) | Self::Json(_) => ErrorCategory::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors from a pull request provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid pull request list: {0}")]
    Json(#[from] serde_json::Error),
}

/// One failed step of the apply phase.
#[derive(Debug)]
pub struct ApplyFailure {
    /// `None` for owned objects that matched no branch
    pub branch_id: Option<BranchId>,
    pub operation: Operation,
    pub kind: Kind,
    pub name: String,
    pub error: StoreError,
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch_id {
            Some(id) => write!(f, "{id}: ")?,
            None => f.write_str("stray: ")?,
        }
        write!(
            f,
            "{} {} {}: {}",
            self.operation, self.kind, self.name, self.error
        )?;
        if self.operation == Operation::Create
            && matches!(self.error, StoreError::AlreadyExists { .. })
        {
            // Listed objects are never created, so this one isn't ours
            f.write_str(
                " (not owned by this template; another template sharing the same \
                 source, or a hand-made object, holds the name)",
            )?;
        }
        Ok(())
    }
}

/// Every failure of an apply phase, in branch order.
#[derive(Debug, Default)]
pub struct ApplyFailures(pub Vec<ApplyFailure>);

impl ApplyFailures {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApplyFailure> {
        self.0.iter()
    }

    /// Branches with at least one failure
    pub fn branch_ids(&self) -> Vec<&BranchId> {
        let mut ids: Vec<&BranchId> = self.0.iter().filter_map(|f| f.branch_id.as_ref()).collect();
        ids.dedup();
        ids
    }

    pub fn is_retryable(&self) -> bool {
        self.0.iter().all(|f| f.error.is_retryable())
    }
}

impl fmt::Display for ApplyFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} branch operation(s) failed", self.0.len())?;
        for failure in &self.0 {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

/// Errors returned by a reconcile pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Template or source missing
    #[error("unable to get {kind} {namespace}/{name}: not found")]
    NotFound {
        kind: Kind,
        namespace: String,
        name: String,
    },

    #[error("cannot access {kind}/{namespace}/{name}, cross-namespace references have been disabled")]
    AccessDenied {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("branch based planner does not support source kind: {0}")]
    UnsupportedKind(String),

    #[error("source {namespace}/{name} does not track a branch")]
    UntrackedSource { namespace: String, name: String },

    #[error("cannot determine repository from source URL: {0}")]
    InvalidRepositoryUrl(String),

    #[error("unable to list pull requests: {0}")]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Apply(ApplyFailures),

    #[error("reconcile cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::AccessDenied { .. } => ErrorCategory::AccessDenied,
            Self::UnsupportedKind(_)
            | Self::UntrackedSource { .. }
            | Self::InvalidRepositoryUrl(_) => ErrorCategory::Configuration,
            Self::Provider(_) => ErrorCategory::Transient,
            Self::Store(e) => e.category(),
            Self::Apply(failures) if failures.is_retryable() => ErrorCategory::Transient,
            Self::Apply(_) => ErrorCategory::Other,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Result type for reconcile passes.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(branch: &str, error: StoreError) -> ApplyFailure {
        ApplyFailure {
            branch_id: Some(BranchId::new(branch, 1)),
            operation: Operation::Create,
            kind: Kind::Terraform,
            name: format!("original-{branch}-1"),
            error,
        }
    }

    #[test]
    fn test_store_error_category() {
        let conflict = StoreError::conflict(Kind::Terraform, "ns", "a", "stale");
        assert_eq!(conflict.category(), ErrorCategory::Conflict);
        assert!(conflict.is_retryable());

        let missing = StoreError::not_found(Kind::GitRepository, "ns", "a");
        assert!(missing.is_not_found());
        assert!(!missing.is_retryable());

        assert!(StoreError::Cancelled.is_retryable());
    }

    #[test]
    fn test_apply_failures_display_lists_each_branch() {
        let failures = ApplyFailures(vec![
            failure(
                "a",
                StoreError::Transient {
                    message: "throttled".into(),
                },
            ),
            failure("b", StoreError::already_exists(Kind::Terraform, "ns", "x")),
        ]);
        let msg = failures.to_string();
        assert!(msg.starts_with("2 branch operation(s) failed"));
        assert!(msg.contains("a-1: create Terraform original-a-1: store unavailable: throttled"));
        assert!(msg.contains("b-1"));
    }

    #[test]
    fn test_already_exists_on_create_names_the_likely_owner() {
        let clash = ApplyFailure {
            branch_id: Some(BranchId::new("b", 1)),
            operation: Operation::Create,
            kind: Kind::GitRepository,
            name: "src-b-1".into(),
            error: StoreError::already_exists(Kind::GitRepository, "ns", "src-b-1"),
        };
        let msg = clash.to_string();
        assert!(msg.starts_with("b-1: create GitRepository src-b-1: GitRepository ns/src-b-1"));
        assert!(msg.contains("not owned by this template"));
        assert!(msg.contains("sharing the same source"));

        let update = ApplyFailure {
            operation: Operation::Update,
            error: StoreError::conflict(Kind::GitRepository, "ns", "src-b-1", "stale"),
            ..clash
        };
        assert!(!update.to_string().contains("not owned"));
    }

    #[test]
    fn test_invalid_object_is_a_configuration_error() {
        let err = StoreError::Invalid {
            message: "derived name \"original-feature/login-7\" is not a valid object name".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_apply_retryable_only_when_all_failures_are() {
        let retryable = ReconcileError::Apply(ApplyFailures(vec![failure(
            "a",
            StoreError::conflict(Kind::Terraform, "ns", "x", "stale"),
        )]));
        assert!(retryable.is_retryable());

        let mixed = ReconcileError::Apply(ApplyFailures(vec![
            failure("a", StoreError::conflict(Kind::Terraform, "ns", "x", "stale")),
            failure("b", StoreError::already_exists(Kind::Terraform, "ns", "y")),
        ]));
        assert!(!mixed.is_retryable());
    }

    #[test]
    fn test_configuration_errors_not_retryable() {
        let err = ReconcileError::UnsupportedKind("Bucket".into());
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "branch based planner does not support source kind: Bucket"
        );
    }
}

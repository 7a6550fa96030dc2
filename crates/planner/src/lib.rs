//! # Planner
//!
//! Branch-based planning: keep one plan-only copy of a template Terraform
//! object, and one copy of its GitRepository source, per open pull request.
//!
//! ## Core Concepts
//!
//! - **Template**: the Terraform object being mirrored, never modified
//! - **Branch id**: `<headBranch>-<number>`, the key of a derived pair
//! - **Derived pair**: `<template>-<branchId>` plus `<source>-<branchId>`,
//!   labelled with the owner markers
//! - **Pass**: derive the desired pairs, list the owned ones, diff, apply
//!
//! ## Example
//!
//! ```ignore
//! use planner::{MemoryStore, ReconcileContext, Reconciler};
//!
//! let reconciler = Reconciler::new(MemoryStore::new());
//! let (template, source) = reconciler.resolve("flux-system", "helloworld")?;
//! let summary = reconciler.reconcile(
//!     &ReconcileContext::default(),
//!     &template,
//!     &source,
//!     &pull_requests,
//! )?;
//! println!("{} created, {} deleted", summary.created, summary.deleted);
//! ```
//!
//! ## Seams
//!
//! - [`ObjectStore`]: where objects live
//! - [`PullRequestProvider`]: where open pull requests come from
//! - [`ProgressCallback`]: receives per-branch outcomes
//!
//! Passes are stateless and idempotent; a failed pass is retried by running
//! it again.

pub mod context;
pub mod derive;
pub mod diff;
pub mod error;
pub mod executor;
pub mod owned;
pub mod provider;
pub mod reconciler;
pub mod resolve;
pub mod store;
pub mod types;

// Re-export main types at crate root
pub use context::{BranchOutcome, Cancellation, NoProgress, ProgressCallback, ReconcileContext};
pub use derive::{DesiredPair, DesiredState, derive, derived_name};
pub use diff::{BranchChange, DerivedObject, DiffSummary, Operation, ReconcilePlan, Step};
pub use error::{
    ApplyFailure, ApplyFailures, ErrorCategory, ProviderError, ReconcileError, StoreError,
};
pub use executor::{ApplyReport, ApplySummary, apply_plan};
pub use owned::{OwnedObjects, Stray, list_owned};
pub use provider::{
    BranchId, JsonFileProvider, PullRequest, PullRequestProvider, Repository, StaticProvider,
};
pub use reconciler::Reconciler;
pub use resolve::ReferencePolicy;
pub use store::{FileStore, LabelSelector, MemoryStore, ObjectStore};
pub use types::{
    GitRepository, GitRepositorySpec, Kind, ObjectMeta, Object, SourceReference, Terraform,
    TerraformSpec,
};

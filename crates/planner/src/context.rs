//! Reconcile context and callback traits
//!
//! These let the planner report progress and be stopped without depending
//! on any particular UI or signal handling.

use crate::diff::BranchChange;
use crate::error::StoreError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag for stopping a pass
///
/// Once cancelled, no new store operation is issued. Operations already
/// in flight complete (or fail) on their own.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How one branch unit ended
#[derive(Debug)]
pub enum BranchOutcome<'a> {
    /// Every step applied
    Applied,
    /// A step failed; later steps of the unit were not attempted
    Failed(&'a StoreError),
}

/// Progress callback for apply operations
///
/// Units run on a thread pool, so completion is reported once the whole
/// batch is done, in plan order.
pub trait ProgressCallback: Send {
    /// Called before any unit is applied
    fn on_apply_start(&mut self, units: usize);

    /// Called when a unit finishes
    fn on_unit_complete(&mut self, change: &BranchChange, outcome: &BranchOutcome<'_>);

    /// Called after every unit has finished
    fn on_apply_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_apply_start(&mut self, _units: usize) {}
    fn on_unit_complete(&mut self, _change: &BranchChange, _outcome: &BranchOutcome<'_>) {}
    fn on_apply_complete(&mut self) {}
}

/// Per-call options for a reconcile pass
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    pub cancellation: Cancellation,
    /// Number of branch units applied in parallel
    pub jobs: usize,
}

impl ReconcileContext {
    pub fn new(jobs: usize) -> Self {
        Self {
            cancellation: Cancellation::new(),
            jobs: jobs.max(1),
        }
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for ReconcileContext {
    fn default() -> Self {
        Self::new(4)
    }
}

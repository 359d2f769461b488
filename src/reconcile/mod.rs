//! Reconciliation of configured tabs against the live tabs of a window.

pub mod engine;
pub mod plan;

pub use engine::{
    EntryOutcome, EntryResult, ReconcileConfig, ReconcileEngine, ReconcileResult,
    ReconcileSummary,
};
pub use plan::{Classification, PlannedEntry, ReconcilePlan};

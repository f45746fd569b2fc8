//! Reconciler: detects and heals drift between the balance cache and the
//! ledger, and re-validates the accounting equation.

pub mod job;
pub mod reconciler;
pub mod types;

pub use job::ReconcilerJob;
pub use reconciler::Reconciler;
pub use types::{
    AccountRepair, AlertKind, AlertSeverity, DriftAlert, DriftStatus, ReconcileReport,
    ReconcilerSettings, RunTrigger, TriggerOutcome,
};

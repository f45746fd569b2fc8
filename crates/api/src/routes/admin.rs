//! Reconciler administration routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tally_core::reconcile::{RunTrigger, TriggerOutcome};
use tally_core::store::LedgerStore;

use crate::AppState;
use crate::error::ledger_error_response;

/// Creates the admin routes.
pub fn routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/admin/reconcile", post(trigger_reconcile::<S>))
        .route("/admin/drift", get(drift_status::<S>))
}

/// POST `/admin/reconcile` - Run the reconciler now.
///
/// When a run is already in flight nothing new starts and the current status
/// is returned instead.
async fn trigger_reconcile<S: LedgerStore>(State(state): State<AppState<S>>) -> Response {
    match state.ledger.reconciler().trigger(RunTrigger::Manual).await {
        Ok(TriggerOutcome::Completed(report)) => (
            StatusCode::OK,
            Json(json!({ "outcome": "completed", "report": report })),
        )
            .into_response(),
        Ok(TriggerOutcome::AlreadyRunning(status)) => (
            StatusCode::OK,
            Json(json!({ "outcome": "already_running", "status": status })),
        )
            .into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// GET `/admin/drift` - Reconciler status and the last report.
async fn drift_status<S: LedgerStore>(State(state): State<AppState<S>>) -> Response {
    (StatusCode::OK, Json(state.ledger.reconciler().status())).into_response()
}

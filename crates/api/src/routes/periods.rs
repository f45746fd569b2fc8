//! Accounting period routes: listing, date lookup, preview and closing.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tally_core::closing::ClosePeriodRequest;
use tally_core::store::LedgerStore;
use tracing::info;

use crate::AppState;
use crate::error::ledger_error_response;

/// Creates the period routes.
pub fn routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/periods", get(list_periods::<S>))
        .route("/periods/last-closing", get(last_closing::<S>))
        .route("/periods/date-info", get(date_info::<S>))
        .route("/periods/close-preview", get(close_preview::<S>))
        .route("/periods/close", post(close_period::<S>))
}

/// Query parameters for a closing preview.
#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    /// Last day of the period to preview.
    pub period_end: NaiveDate,
}

/// Query parameters for a date lookup.
#[derive(Debug, Deserialize)]
pub struct DateInfoQuery {
    /// Date to look up.
    pub date: NaiveDate,
}

/// GET `/periods` - Closed periods, oldest first.
async fn list_periods<S: LedgerStore>(State(state): State<AppState<S>>) -> Response {
    match state.ledger.closing().list_periods().await {
        Ok(periods) => (StatusCode::OK, Json(json!({ "periods": periods }))).into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// GET `/periods/last-closing` - Latest close and the next start date.
async fn last_closing<S: LedgerStore>(State(state): State<AppState<S>>) -> Response {
    match state.ledger.closing().last_closing().await {
        Ok(last) => (StatusCode::OK, Json(last)).into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// GET `/periods/date-info?date=` - Whether a date is still open for posting.
async fn date_info<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<DateInfoQuery>,
) -> Response {
    match state.ledger.closing().period_for_date(query.date).await {
        Ok(info) => (StatusCode::OK, Json(info)).into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// GET `/periods/close-preview?period_end=` - What a close would post.
async fn close_preview<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Query(query): Query<PreviewQuery>,
) -> Response {
    match state.ledger.closing().preview(query.period_end).await {
        Ok(preview) => (StatusCode::OK, Json(preview)).into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// POST `/periods/close` - Close a period into retained earnings.
async fn close_period<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<ClosePeriodRequest>,
) -> Response {
    match state.ledger.closing().close_period(payload).await {
        Ok(result) => {
            info!(
                period_id = %result.period.id,
                net_income = %result.net_income,
                "Period closed via API"
            );
            (StatusCode::CREATED, Json(result)).into_response()
        }
        Err(e) => ledger_error_response(&e),
    }
}

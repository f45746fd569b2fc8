//! Account directory and balance routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tally_core::account::NewAccount;
use tally_core::balance::Freshness;
use tally_core::store::LedgerStore;
use tally_shared::types::AccountId;
use tracing::info;

use crate::AppState;
use crate::error::ledger_error_response;

/// Creates the account routes.
pub fn routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/accounts", get(list_accounts::<S>).post(create_account::<S>))
        .route("/accounts/{account_id}/deactivate", post(deactivate_account::<S>))
        .route("/accounts/{account_id}/balance", get(get_account_balance::<S>))
}

/// How a balance is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceMode {
    /// Snapshot value with its freshness marker.
    #[default]
    Cached,
    /// Recomputed from posted lines; refreshes the snapshot.
    Audit,
}

/// Query parameters for reading a balance.
#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    /// Read mode, `cached` by default.
    #[serde(default)]
    pub mode: BalanceMode,
}

/// Response for a balance read.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Account ID.
    pub account_id: AccountId,
    /// Mode the balance was read with.
    pub mode: BalanceMode,
    /// Balance on the account's normal side.
    pub balance: Decimal,
    /// Freshness of the snapshot behind the balance.
    pub freshness: Option<Freshness>,
}

/// GET `/accounts` - Chart of accounts with cached balances and rollups.
async fn list_accounts<S: LedgerStore>(State(state): State<AppState<S>>) -> Response {
    match state.ledger.projector().account_balances().await {
        Ok(accounts) => (StatusCode::OK, Json(json!({ "accounts": accounts }))).into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// POST `/accounts` - Create an account.
async fn create_account<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<NewAccount>,
) -> Response {
    match state.ledger.directory().create_account(payload).await {
        Ok(account) => {
            info!(account_id = %account.id, code = %account.code, "Account created");
            (StatusCode::CREATED, Json(account)).into_response()
        }
        Err(e) => ledger_error_response(&e),
    }
}

/// POST `/accounts/{account_id}/deactivate` - Deactivate an account.
async fn deactivate_account<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(account_id): Path<AccountId>,
) -> Response {
    match state.ledger.directory().deactivate(account_id).await {
        Ok(account) => (StatusCode::OK, Json(account)).into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

/// GET `/accounts/{account_id}/balance` - Cached or audited balance.
async fn get_account_balance<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(account_id): Path<AccountId>,
    Query(query): Query<BalanceQuery>,
) -> Response {
    let projector = state.ledger.projector();

    let balance = match query.mode {
        BalanceMode::Cached => None,
        BalanceMode::Audit => match projector.audit_balance(account_id).await {
            Ok(balance) => Some(balance),
            Err(e) => return ledger_error_response(&e),
        },
    };

    match projector.cached_balance(account_id).await {
        Ok(cached) => (
            StatusCode::OK,
            Json(BalanceResponse {
                account_id,
                mode: query.mode,
                balance: balance.unwrap_or(cached.balance),
                freshness: cached.freshness,
            }),
        )
            .into_response(),
        Err(e) => ledger_error_response(&e),
    }
}

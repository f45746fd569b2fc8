//! API route definitions.

use axum::Router;
use tally_core::store::LedgerStore;

use crate::AppState;

pub mod accounts;
pub mod admin;
pub mod health;
pub mod journal_entries;
pub mod periods;

/// Creates the API router with all routes.
pub fn api_routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .merge(health::routes())
        .merge(accounts::routes())
        .merge(journal_entries::routes())
        .merge(periods::routes())
        .merge(admin::routes())
}

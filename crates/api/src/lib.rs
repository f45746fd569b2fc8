//! HTTP API layer with Axum routes.
//!
//! This crate provides:
//! - REST routes for accounts, journal entries, periods and reconciliation
//! - Mapping of ledger errors to JSON error responses
//!
//! The router is generic over the [`LedgerStore`] so the same routes serve
//! the PostgreSQL store in production and the in-memory store in tests.

pub mod error;
pub mod routes;

use axum::Router;
use tally_core::Ledger;
use tally_core::store::LedgerStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
pub struct AppState<S> {
    /// The ledger and all of its components.
    pub ledger: Ledger<S>,
}

impl<S> AppState<S> {
    /// Wraps a ledger.
    pub fn new(ledger: Ledger<S>) -> Self {
        Self { ledger }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
        }
    }
}

/// Creates the main application router.
pub fn create_router<S: LedgerStore>(state: AppState<S>) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

//! Ledger error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tally_core::ledger::{ErrorKind, LedgerError};
use tracing::{error, warn};

/// Converts a ledger error into a JSON error response.
///
/// The body carries the stable error code, the message and whether a retry
/// may succeed. Storage and consistency failures are logged at error level,
/// conflicts at warn level.
pub fn ledger_error_response(err: &LedgerError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    match err.kind() {
        ErrorKind::Storage | ErrorKind::ConsistencyDrift => {
            error!(error = %err, code = err.error_code(), "Ledger operation failed");
        }
        ErrorKind::ClosingConflict | ErrorKind::DuplicateSource => {
            warn!(error = %err, code = err.error_code(), "Ledger operation rejected");
        }
        ErrorKind::Validation | ErrorKind::NotFound => {}
    }

    let message = if status.is_server_error() {
        "An error occurred".to_string()
    } else {
        err.to_string()
    };

    (
        status,
        Json(json!({
            "error": err.error_code(),
            "message": message,
            "retryable": err.is_retryable(),
        })),
    )
        .into_response()
}

//! Journal entry routes: posting, lookup and reversal.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::account::Side;
use tally_core::ledger::{
    DraftLine, JournalDraft, LedgerError, PostedEntry, PostingOutcome, ReverseRequest, SourceRef,
};
use tally_core::store::LedgerStore;
use tally_shared::types::{AccountId, JournalEntryId};

use crate::AppState;
use crate::error::ledger_error_response;

/// Creates the journal entry routes.
pub fn routes<S: LedgerStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/journal-entries", post(post_entry::<S>))
        .route("/journal-entries/{entry_id}", get(get_entry::<S>))
        .route("/journal-entries/{entry_id}/reverse", post(reverse_entry::<S>))
}

/// Request body for posting a journal entry.
#[derive(Debug, Deserialize)]
pub struct PostEntryRequest {
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Entry description.
    pub description: String,
    /// Optional external reference.
    pub reference: Option<String>,
    /// Originating document; posting it twice returns the first entry.
    pub source: SourceRef,
    /// Entry lines.
    pub lines: Vec<LineRequest>,
}

/// One line of a posting request.
///
/// Either `side` with `amount`, or exactly one of `debit`/`credit`.
#[derive(Debug, Deserialize)]
pub struct LineRequest {
    /// Account to post to.
    pub account_id: AccountId,
    /// Side of the line.
    pub side: Option<Side>,
    /// Positive amount on `side`.
    pub amount: Option<Decimal>,
    /// Debit amount.
    pub debit: Option<Decimal>,
    /// Credit amount.
    pub credit: Option<Decimal>,
    /// Line memo.
    pub description: Option<String>,
}

impl LineRequest {
    fn into_draft_line(self) -> Result<DraftLine, LedgerError> {
        let line = match (self.side, self.amount) {
            (Some(side), Some(amount)) if self.debit.is_none() && self.credit.is_none() => {
                DraftLine {
                    account_id: self.account_id,
                    side,
                    amount,
                    description: None,
                }
            }
            (None, None) => DraftLine::from_amounts(
                self.account_id,
                self.debit.unwrap_or_default(),
                self.credit.unwrap_or_default(),
            )?,
            _ => return Err(LedgerError::InvalidLineAmounts),
        };
        Ok(match self.description {
            Some(description) => line.with_description(description),
            None => line,
        })
    }
}

impl PostEntryRequest {
    /// Converts the request into a draft.
    pub fn into_draft(self) -> Result<JournalDraft, LedgerError> {
        let lines = self
            .lines
            .into_iter()
            .map(LineRequest::into_draft_line)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JournalDraft {
            entry_date: self.entry_date,
            description: self.description,
            reference: self.reference,
            source: self.source,
            lines,
        })
    }
}

/// Response for a posting or reversal.
#[derive(Debug, Serialize)]
pub struct PostingResponse {
    /// The entry with its lines.
    #[serde(flatten)]
    pub entry: PostedEntry,
    /// True when the source had already been posted.
    pub replayed: bool,
    /// Non-fatal problems, such as a deferred balance update.
    pub warnings: Vec<String>,
}

fn posting_response(outcome: PostingOutcome) -> Response {
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (
        status,
        Json(PostingResponse {
            entry: outcome.entry,
            replayed: outcome.replayed,
            warnings: outcome.warnings,
        }),
    )
        .into_response()
}

/// POST `/journal-entries` - Post a draft.
///
/// Returns 201 for a new entry and 200 when the source was already posted.
async fn post_entry<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Json(payload): Json<PostEntryRequest>,
) -> Response {
    let draft = match payload.into_draft() {
        Ok(draft) => draft,
        Err(e) => return ledger_error_response(&e),
    };

    match state.ledger.posting().post(draft).await {
        Ok(outcome) => posting_response(outcome),
        Err(e) => ledger_error_response(&e),
    }
}

/// GET `/journal-entries/{entry_id}` - Entry with its lines.
async fn get_entry<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(entry_id): Path<JournalEntryId>,
) -> Response {
    match state.ledger.store().find_entry(entry_id).await {
        Ok(Some(entry)) => (StatusCode::OK, Json(entry)).into_response(),
        Ok(None) => ledger_error_response(&LedgerError::EntryNotFound(entry_id)),
        Err(e) => ledger_error_response(&LedgerError::from(e)),
    }
}

/// POST `/journal-entries/{entry_id}/reverse` - Reverse a posted entry.
///
/// The body is optional; reversing twice returns the existing reversal.
async fn reverse_entry<S: LedgerStore>(
    State(state): State<AppState<S>>,
    Path(entry_id): Path<JournalEntryId>,
    payload: Option<Json<ReverseRequest>>,
) -> Response {
    let request = payload.map(|Json(request)| request).unwrap_or_default();

    match state.ledger.posting().reverse(entry_id, request).await {
        Ok(outcome) => posting_response(outcome),
        Err(e) => ledger_error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn line(value: serde_json::Value) -> LineRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_side_and_amount_line() {
        let account = AccountId::new();
        let draft_line = line(json!({
            "account_id": account,
            "side": "CREDIT",
            "amount": "25.00",
        }))
        .into_draft_line()
        .unwrap();
        assert_eq!(draft_line, DraftLine::credit(account, dec!(25.00)));
    }

    #[test]
    fn test_debit_credit_pair_line() {
        let account = AccountId::new();
        let draft_line = line(json!({
            "account_id": account,
            "debit": "10.50",
            "description": "Stationery",
        }))
        .into_draft_line()
        .unwrap();
        assert_eq!(draft_line.side, Side::Debit);
        assert_eq!(draft_line.amount, dec!(10.50));
        assert_eq!(draft_line.description.as_deref(), Some("Stationery"));
    }

    #[test]
    fn test_mixed_line_forms_rejected() {
        let result = line(json!({
            "account_id": AccountId::new(),
            "side": "DEBIT",
            "amount": "1",
            "debit": "1",
        }))
        .into_draft_line();
        assert!(matches!(result, Err(LedgerError::InvalidLineAmounts)));

        let result = line(json!({
            "account_id": AccountId::new(),
            "debit": "1",
            "credit": "1",
        }))
        .into_draft_line();
        assert!(matches!(result, Err(LedgerError::InvalidLineAmounts)));
    }
}

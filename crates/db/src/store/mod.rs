//! PostgreSQL implementation of the ledger store.
//!
//! Every entry commit runs in one database transaction that takes, in order:
//! 1. The period advisory lock (shared for postings, exclusive for closes)
//! 2. One advisory lock per touched account, in ascending id order
//!
//! and then re-checks the source, the closed-period rule and the requested
//! side effect before writing.

mod convert;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ActiveValue::Unchanged, ColumnTrait, ConnectionTrait,
    DatabaseConnection, DbBackend, DbErr, EntityTrait, FromQueryResult, QueryFilter, QueryOrder,
    QuerySelect, SqlErr, Statement, TransactionTrait, Value,
};
use tally_core::account::{Account, Side};
use tally_core::balance::{BalanceDelta, BalanceSnapshot};
use tally_core::closing::AccountingPeriod;
use tally_core::ledger::{EntryStatus, PostedEntry, SourceRef};
use tally_core::store::{CommitEffect, CommitRequest, LedgerStore, LineTotals, StoreError};
use tally_shared::types::{AccountId, JournalEntryId};
use tracing::debug;
use uuid::Uuid;

use self::convert::{
    account_from_model, account_to_active, backend, count_from_db, count_to_db, entry_from_model,
    entry_to_active, line_from_model, line_to_active, period_from_model, period_to_active,
    snapshot_from_model, snapshot_to_active,
};
use crate::entities::{
    accounting_periods, accounts, balance_snapshots, journal_entries, journal_lines,
};

/// Advisory lock key serializing period closes against postings.
const PERIOD_LOCK_KEY: i64 = 0x7461_6c6c_7950_4552;

const COUNTED_STATUSES: &str = "e.status IN ('POSTED', 'REVERSED')";

#[derive(Debug, FromQueryResult)]
struct TotalsRow {
    account_id: Uuid,
    debit: Decimal,
    credit: Decimal,
    line_count: i64,
}

impl TotalsRow {
    fn totals(&self) -> LineTotals {
        LineTotals {
            debit: self.debit,
            credit: self.credit,
            line_count: count_from_db(self.line_count),
        }
    }
}

#[derive(Debug, FromQueryResult)]
struct EarliestRow {
    earliest: Option<NaiveDate>,
}

/// Ledger store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
}

impl PgLedgerStore {
    /// Creates a store over a connection pool.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn source_entry_id(&self, source: &SourceRef) -> Result<Option<JournalEntryId>, StoreError> {
        find_source(&self.db, source).await
    }

    async fn load_lines(&self, entry_id: Uuid) -> Result<Vec<journal_lines::Model>, StoreError> {
        journal_lines::Entity::find()
            .filter(journal_lines::Column::EntryId.eq(entry_id))
            .order_by_asc(journal_lines::Column::LineNumber)
            .all(&self.db)
            .await
            .map_err(backend)
    }

    async fn posted(&self, model: journal_entries::Model) -> Result<PostedEntry, StoreError> {
        let lines = self.load_lines(model.id).await?;
        Ok(PostedEntry {
            entry: entry_from_model(model)?,
            lines: lines.into_iter().map(line_from_model).collect(),
        })
    }

    async fn line_totals(
        &self,
        account_id: Option<AccountId>,
        through: Option<NaiveDate>,
    ) -> Result<Vec<TotalsRow>, StoreError> {
        let mut sql = format!(
            "SELECT l.account_id, \
                    COALESCE(SUM(l.debit_amount), 0) AS debit, \
                    COALESCE(SUM(l.credit_amount), 0) AS credit, \
                    COUNT(*) AS line_count \
             FROM journal_lines l \
             JOIN journal_entries e ON e.id = l.entry_id \
             WHERE {COUNTED_STATUSES}"
        );
        let mut values: Vec<Value> = Vec::new();
        if let Some(account_id) = account_id {
            values.push(account_id.into_inner().into());
            sql.push_str(&format!(" AND l.account_id = ${}", values.len()));
        }
        if let Some(through) = through {
            values.push(through.into());
            sql.push_str(&format!(" AND e.entry_date <= ${}", values.len()));
        }
        sql.push_str(" GROUP BY l.account_id");

        TotalsRow::find_by_statement(Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            values,
        ))
        .all(&self.db)
        .await
        .map_err(backend)
    }
}

fn account_lock_key(account_id: AccountId) -> i64 {
    let (high, low) = account_id.into_inner().as_u64_pair();
    i64::from_ne_bytes((high ^ low).to_ne_bytes())
}

async fn advisory_lock<C: ConnectionTrait>(conn: &C, key: i64, shared: bool) -> Result<(), StoreError> {
    let sql = if shared {
        "SELECT pg_advisory_xact_lock_shared($1)"
    } else {
        "SELECT pg_advisory_xact_lock($1)"
    };
    conn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql,
        [key.into()],
    ))
    .await
    .map_err(backend)?;
    Ok(())
}

async fn find_source<C: ConnectionTrait>(
    conn: &C,
    source: &SourceRef,
) -> Result<Option<JournalEntryId>, StoreError> {
    Ok(journal_entries::Entity::find()
        .filter(journal_entries::Column::SourceKind.eq(source.kind.as_str()))
        .filter(journal_entries::Column::SourceId.eq(source.id.as_str()))
        .one(conn)
        .await
        .map_err(backend)?
        .map(|m| JournalEntryId::from_uuid(m.id)))
}

async fn closed_through<C: ConnectionTrait>(conn: &C) -> Result<Option<NaiveDate>, StoreError> {
    Ok(accounting_periods::Entity::find()
        .order_by_desc(accounting_periods::Column::EndDate)
        .one(conn)
        .await
        .map_err(backend)?
        .map(|p| p.end_date))
}

fn check_close_order(period: &AccountingPeriod, closed_through: Option<NaiveDate>) -> Result<(), StoreError> {
    match closed_through {
        Some(end) if period.end_date <= end => Err(StoreError::ClosingConflict(format!(
            "period ending {} is not after the latest closed period ending {end}",
            period.end_date
        ))),
        _ => Ok(()),
    }
}

fn is_unique_violation(e: &DbErr, constraint: &str) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(msg)) if msg.contains(constraint))
}

impl LedgerStore for PgLedgerStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        accounts::Entity::find()
            .order_by_asc(accounts::Column::Code)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(account_from_model)
            .collect()
    }

    async fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        match account_to_active(&account).insert(&self.db).await {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e, "code") => {
                Err(StoreError::DuplicateAccountCode(account.code))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn set_account_active(
        &self,
        account_id: AccountId,
        is_active: bool,
    ) -> Result<Account, StoreError> {
        let model = accounts::Entity::find_by_id(account_id.into_inner())
            .one(&self.db)
            .await
            .map_err(backend)?
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let mut active: accounts::ActiveModel = model.into();
        active.is_active = Set(is_active);
        let updated = active.update(&self.db).await.map_err(backend)?;
        account_from_model(updated)
    }

    async fn find_entry(&self, entry_id: JournalEntryId) -> Result<Option<PostedEntry>, StoreError> {
        let model = journal_entries::Entity::find_by_id(entry_id.into_inner())
            .one(&self.db)
            .await
            .map_err(backend)?;
        match model {
            Some(model) => Ok(Some(self.posted(model).await?)),
            None => Ok(None),
        }
    }

    async fn find_entry_by_source(
        &self,
        source: &SourceRef,
    ) -> Result<Option<PostedEntry>, StoreError> {
        match self.source_entry_id(source).await? {
            Some(entry_id) => self.find_entry(entry_id).await,
            None => Ok(None),
        }
    }

    async fn commit_entry(&self, request: CommitRequest) -> Result<PostedEntry, StoreError> {
        let CommitRequest {
            entry,
            lines,
            effect,
        } = request;
        let txn = self.db.begin().await.map_err(backend)?;

        let closes = matches!(effect, CommitEffect::ClosesPeriod(_));
        advisory_lock(&txn, PERIOD_LOCK_KEY, !closes).await?;
        let mut touched: Vec<AccountId> = lines.iter().map(|l| l.account_id).collect();
        touched.sort_unstable();
        touched.dedup();
        for account_id in &touched {
            advisory_lock(&txn, account_lock_key(*account_id), false).await?;
        }

        if let Some(existing) = find_source(&txn, &entry.source).await? {
            return Err(StoreError::DuplicateSource { existing });
        }
        let closed_through = closed_through(&txn).await?;
        if let Some(closed_through) = closed_through {
            if entry.entry_date <= closed_through {
                return Err(StoreError::PeriodClosed {
                    date: entry.entry_date,
                    closed_through,
                });
            }
        }
        match &effect {
            CommitEffect::None => {}
            CommitEffect::Reverses(original_id) => {
                let original = journal_entries::Entity::find_by_id(original_id.into_inner())
                    .lock_exclusive()
                    .one(&txn)
                    .await
                    .map_err(backend)?
                    .ok_or(StoreError::EntryNotFound(*original_id))?;
                if original.status != EntryStatus::Posted.as_str() {
                    return Err(StoreError::AlreadyReversed(*original_id));
                }
            }
            CommitEffect::ClosesPeriod(period) => check_close_order(period, closed_through)?,
        }

        if let Err(e) = entry_to_active(&entry).insert(&txn).await {
            if is_unique_violation(&e, "uq_journal_entries_source") {
                txn.rollback().await.map_err(backend)?;
                return match self.source_entry_id(&entry.source).await? {
                    Some(existing) => Err(StoreError::DuplicateSource { existing }),
                    None => Err(backend(e)),
                };
            }
            return Err(backend(e));
        }
        journal_lines::Entity::insert_many(lines.iter().map(line_to_active))
            .exec(&txn)
            .await
            .map_err(backend)?;

        match &effect {
            CommitEffect::None => {}
            CommitEffect::Reverses(original_id) => {
                journal_entries::ActiveModel {
                    id: Unchanged(original_id.into_inner()),
                    status: Set(EntryStatus::Reversed.as_str().to_string()),
                    reversed_by: Set(Some(entry.id.into_inner())),
                    ..Default::default()
                }
                .update(&txn)
                .await
                .map_err(backend)?;
            }
            CommitEffect::ClosesPeriod(period) => {
                period_to_active(period).insert(&txn).await.map_err(|e| {
                    if is_unique_violation(&e, "uq_accounting_periods_end") {
                        StoreError::ClosingConflict(format!(
                            "period ending {} is already closed",
                            period.end_date
                        ))
                    } else {
                        backend(e)
                    }
                })?;
            }
        }

        txn.commit().await.map_err(backend)?;
        debug!(entry_id = %entry.id, lines = lines.len(), "Journal entry committed");
        Ok(PostedEntry { entry, lines })
    }

    async fn record_closed_period(
        &self,
        period: AccountingPeriod,
    ) -> Result<AccountingPeriod, StoreError> {
        let txn = self.db.begin().await.map_err(backend)?;
        advisory_lock(&txn, PERIOD_LOCK_KEY, false).await?;
        check_close_order(&period, closed_through(&txn).await?)?;

        let model = period_to_active(&period)
            .insert(&txn)
            .await
            .map_err(backend)?;
        txn.commit().await.map_err(backend)?;
        period_from_model(model)
    }

    async fn list_periods(&self) -> Result<Vec<AccountingPeriod>, StoreError> {
        accounting_periods::Entity::find()
            .order_by_asc(accounting_periods::Column::EndDate)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(period_from_model)
            .collect()
    }

    async fn latest_closed_period(&self) -> Result<Option<AccountingPeriod>, StoreError> {
        accounting_periods::Entity::find()
            .order_by_desc(accounting_periods::Column::EndDate)
            .one(&self.db)
            .await
            .map_err(backend)?
            .map(period_from_model)
            .transpose()
    }

    async fn earliest_entry_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        let row = EarliestRow::find_by_statement(Statement::from_string(
            DbBackend::Postgres,
            format!("SELECT MIN(e.entry_date) AS earliest FROM journal_entries e WHERE {COUNTED_STATUSES}"),
        ))
        .one(&self.db)
        .await
        .map_err(backend)?;
        Ok(row.and_then(|r| r.earliest))
    }

    async fn account_line_totals(
        &self,
        account_id: AccountId,
        through: Option<NaiveDate>,
    ) -> Result<LineTotals, StoreError> {
        Ok(self
            .line_totals(Some(account_id), through)
            .await?
            .first()
            .map(TotalsRow::totals)
            .unwrap_or_default())
    }

    async fn posted_line_totals(&self) -> Result<HashMap<AccountId, LineTotals>, StoreError> {
        Ok(self
            .line_totals(None, None)
            .await?
            .iter()
            .map(|row| (AccountId::from_uuid(row.account_id), row.totals()))
            .collect())
    }

    async fn load_snapshot(
        &self,
        account_id: AccountId,
    ) -> Result<Option<BalanceSnapshot>, StoreError> {
        Ok(balance_snapshots::Entity::find_by_id(account_id.into_inner())
            .one(&self.db)
            .await
            .map_err(backend)?
            .map(snapshot_from_model))
    }

    async fn list_snapshots(&self) -> Result<Vec<BalanceSnapshot>, StoreError> {
        Ok(balance_snapshots::Entity::find()
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(snapshot_from_model)
            .collect())
    }

    async fn save_snapshot(&self, snapshot: BalanceSnapshot) -> Result<(), StoreError> {
        balance_snapshots::Entity::insert(snapshot_to_active(&snapshot))
            .on_conflict(
                OnConflict::column(balance_snapshots::Column::AccountId)
                    .update_columns([
                        balance_snapshots::Column::Balance,
                        balance_snapshots::Column::DebitTotal,
                        balance_snapshots::Column::CreditTotal,
                        balance_snapshots::Column::PostedLineCount,
                        balance_snapshots::Column::Version,
                        balance_snapshots::Column::RefreshedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn increment_snapshot(
        &self,
        delta: &BalanceDelta,
        normal_side: Side,
        refreshed_at: DateTime<Utc>,
    ) -> Result<Option<BalanceSnapshot>, StoreError> {
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r"UPDATE balance_snapshots
              SET debit_total = debit_total + $2,
                  credit_total = credit_total + $3,
                  balance = balance + $4,
                  posted_line_count = posted_line_count + $5,
                  version = version + 1,
                  refreshed_at = $6
              WHERE account_id = $1
              RETURNING *",
            [
                delta.account_id.into_inner().into(),
                delta.debit.into(),
                delta.credit.into(),
                normal_side.signed(delta.debit, delta.credit).into(),
                count_to_db(delta.line_count).into(),
                refreshed_at.fixed_offset().into(),
            ],
        );
        Ok(balance_snapshots::Entity::find()
            .from_raw_sql(statement)
            .one(&self.db)
            .await
            .map_err(backend)?
            .map(snapshot_from_model))
    }
}

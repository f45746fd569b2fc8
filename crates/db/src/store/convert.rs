//! Conversions between table rows and ledger types.

use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Set, DbErr};
use tally_core::account::{Account, AccountType};
use tally_core::balance::BalanceSnapshot;
use tally_core::closing::{AccountingPeriod, PeriodStatus};
use tally_core::ledger::{EntryStatus, JournalEntry, JournalLine, SourceKind, SourceRef};
use tally_core::store::StoreError;
use tally_shared::types::{AccountId, JournalEntryId, JournalLineId, PeriodId};

use crate::entities::{
    accounting_periods, accounts, balance_snapshots, journal_entries, journal_lines,
};

pub(crate) fn backend(e: DbErr) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn parse<T>(value: &str, column: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .parse()
        .map_err(|e| StoreError::Backend(format!("invalid {column} '{value}': {e}")))
}

pub(crate) fn count_to_db(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

pub(crate) fn count_from_db(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

fn utc(at: sea_orm::prelude::DateTimeWithTimeZone) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

pub(crate) fn account_from_model(model: accounts::Model) -> Result<Account, StoreError> {
    Ok(Account {
        id: AccountId::from_uuid(model.id),
        account_type: parse::<AccountType>(&model.account_type, "account_type")?,
        code: model.code,
        name: model.name,
        parent_id: model.parent_id.map(AccountId::from_uuid),
        is_header: model.is_header,
        is_active: model.is_active,
    })
}

pub(crate) fn account_to_active(account: &Account) -> accounts::ActiveModel {
    accounts::ActiveModel {
        id: Set(account.id.into_inner()),
        code: Set(account.code.clone()),
        name: Set(account.name.clone()),
        account_type: Set(account.account_type.as_str().to_string()),
        parent_id: Set(account.parent_id.map(AccountId::into_inner)),
        is_header: Set(account.is_header),
        is_active: Set(account.is_active),
        created_at: Set(Utc::now().fixed_offset()),
    }
}

pub(crate) fn entry_from_model(model: journal_entries::Model) -> Result<JournalEntry, StoreError> {
    Ok(JournalEntry {
        id: JournalEntryId::from_uuid(model.id),
        entry_date: model.entry_date,
        description: model.description,
        reference: model.reference,
        source: SourceRef::new(
            parse::<SourceKind>(&model.source_kind, "source_kind")?,
            model.source_id,
        ),
        status: parse::<EntryStatus>(&model.status, "status")?,
        total_debit: model.total_debit,
        total_credit: model.total_credit,
        reverses: model.reverses.map(JournalEntryId::from_uuid),
        reversed_by: model.reversed_by.map(JournalEntryId::from_uuid),
        posted_at: model.posted_at.map(utc),
    })
}

pub(crate) fn entry_to_active(entry: &JournalEntry) -> journal_entries::ActiveModel {
    journal_entries::ActiveModel {
        id: Set(entry.id.into_inner()),
        entry_date: Set(entry.entry_date),
        description: Set(entry.description.clone()),
        reference: Set(entry.reference.clone()),
        source_kind: Set(entry.source.kind.as_str().to_string()),
        source_id: Set(entry.source.id.clone()),
        status: Set(entry.status.as_str().to_string()),
        total_debit: Set(entry.total_debit),
        total_credit: Set(entry.total_credit),
        reverses: Set(entry.reverses.map(JournalEntryId::into_inner)),
        reversed_by: Set(entry.reversed_by.map(JournalEntryId::into_inner)),
        posted_at: Set(entry.posted_at.map(|at| at.fixed_offset())),
        created_at: Set(Utc::now().fixed_offset()),
    }
}

pub(crate) fn line_from_model(model: journal_lines::Model) -> JournalLine {
    JournalLine {
        id: JournalLineId::from_uuid(model.id),
        entry_id: JournalEntryId::from_uuid(model.entry_id),
        account_id: AccountId::from_uuid(model.account_id),
        debit_amount: model.debit_amount,
        credit_amount: model.credit_amount,
        line_number: model.line_number,
        description: model.description,
    }
}

pub(crate) fn line_to_active(line: &JournalLine) -> journal_lines::ActiveModel {
    journal_lines::ActiveModel {
        id: Set(line.id.into_inner()),
        entry_id: Set(line.entry_id.into_inner()),
        account_id: Set(line.account_id.into_inner()),
        debit_amount: Set(line.debit_amount),
        credit_amount: Set(line.credit_amount),
        line_number: Set(line.line_number),
        description: Set(line.description.clone()),
    }
}

pub(crate) fn period_from_model(
    model: accounting_periods::Model,
) -> Result<AccountingPeriod, StoreError> {
    Ok(AccountingPeriod {
        id: PeriodId::from_uuid(model.id),
        start_date: model.start_date,
        end_date: model.end_date,
        status: parse::<PeriodStatus>(&model.status, "status")?,
        total_revenue: model.total_revenue,
        total_expense: model.total_expense,
        net_income: model.net_income,
        closing_entry_id: model.closing_entry_id.map(JournalEntryId::from_uuid),
        description: model.description,
        closed_at: model.closed_at.map(utc),
    })
}

pub(crate) fn period_to_active(period: &AccountingPeriod) -> accounting_periods::ActiveModel {
    accounting_periods::ActiveModel {
        id: Set(period.id.into_inner()),
        start_date: Set(period.start_date),
        end_date: Set(period.end_date),
        status: Set(period.status.as_str().to_string()),
        total_revenue: Set(period.total_revenue),
        total_expense: Set(period.total_expense),
        net_income: Set(period.net_income),
        closing_entry_id: Set(period.closing_entry_id.map(JournalEntryId::into_inner)),
        description: Set(period.description.clone()),
        closed_at: Set(period.closed_at.map(|at| at.fixed_offset())),
    }
}

pub(crate) fn snapshot_from_model(model: balance_snapshots::Model) -> BalanceSnapshot {
    BalanceSnapshot {
        account_id: AccountId::from_uuid(model.account_id),
        balance: model.balance,
        debit_total: model.debit_total,
        credit_total: model.credit_total,
        posted_line_count: count_from_db(model.posted_line_count),
        version: count_from_db(model.version),
        refreshed_at: utc(model.refreshed_at),
    }
}

pub(crate) fn snapshot_to_active(snapshot: &BalanceSnapshot) -> balance_snapshots::ActiveModel {
    balance_snapshots::ActiveModel {
        account_id: Set(snapshot.account_id.into_inner()),
        balance: Set(snapshot.balance),
        debit_total: Set(snapshot.debit_total),
        credit_total: Set(snapshot.credit_total),
        posted_line_count: Set(count_to_db(snapshot.posted_line_count)),
        version: Set(count_to_db(snapshot.version)),
        refreshed_at: Set(snapshot.refreshed_at.fixed_offset()),
    }
}

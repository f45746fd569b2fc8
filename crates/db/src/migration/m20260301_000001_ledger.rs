//! Ledger schema.
//!
//! Creates the account, journal, period and balance snapshot tables with the
//! constraints and triggers that keep posted rows immutable.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: CHART OF ACCOUNTS
        // ============================================================
        db.execute_unprepared(ACCOUNTS_SQL).await?;

        // ============================================================
        // PART 2: JOURNAL
        // ============================================================
        db.execute_unprepared(JOURNAL_ENTRIES_SQL).await?;
        db.execute_unprepared(JOURNAL_LINES_SQL).await?;

        // ============================================================
        // PART 3: PERIODS & BALANCE CACHE
        // ============================================================
        db.execute_unprepared(ACCOUNTING_PERIODS_SQL).await?;
        db.execute_unprepared(BALANCE_SNAPSHOTS_SQL).await?;

        // ============================================================
        // PART 4: TRIGGERS
        // ============================================================
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    code VARCHAR(20) NOT NULL UNIQUE,
    name VARCHAR(255) NOT NULL,
    account_type VARCHAR(16) NOT NULL
        CHECK (account_type IN ('ASSET', 'LIABILITY', 'EQUITY', 'REVENUE', 'EXPENSE')),
    parent_id UUID REFERENCES accounts(id),
    is_header BOOLEAN NOT NULL DEFAULT false,
    is_active BOOLEAN NOT NULL DEFAULT true,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_accounts_parent ON accounts(parent_id) WHERE parent_id IS NOT NULL;
CREATE INDEX idx_accounts_type ON accounts(account_type);
";

const JOURNAL_ENTRIES_SQL: &str = r"
CREATE TABLE journal_entries (
    id UUID PRIMARY KEY,
    entry_date DATE NOT NULL,
    description TEXT NOT NULL,
    reference VARCHAR(100),
    source_kind VARCHAR(32) NOT NULL,
    source_id VARCHAR(128) NOT NULL,
    status VARCHAR(16) NOT NULL
        CHECK (status IN ('DRAFT', 'POSTED', 'REVERSED')),
    total_debit NUMERIC(20, 4) NOT NULL,
    total_credit NUMERIC(20, 4) NOT NULL,
    reverses UUID REFERENCES journal_entries(id),
    reversed_by UUID REFERENCES journal_entries(id),
    posted_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_journal_entries_source UNIQUE (source_kind, source_id),
    CONSTRAINT chk_journal_entries_balanced CHECK (total_debit = total_credit)
);

CREATE INDEX idx_journal_entries_date ON journal_entries(entry_date);
CREATE INDEX idx_journal_entries_status ON journal_entries(status);
";

const JOURNAL_LINES_SQL: &str = r"
CREATE TABLE journal_lines (
    id UUID PRIMARY KEY,
    entry_id UUID NOT NULL REFERENCES journal_entries(id),
    account_id UUID NOT NULL REFERENCES accounts(id),
    debit_amount NUMERIC(20, 4) NOT NULL DEFAULT 0 CHECK (debit_amount >= 0),
    credit_amount NUMERIC(20, 4) NOT NULL DEFAULT 0 CHECK (credit_amount >= 0),
    line_number INTEGER NOT NULL,
    description TEXT,
    CONSTRAINT uq_journal_lines_number UNIQUE (entry_id, line_number),
    CONSTRAINT chk_journal_lines_one_side CHECK ((debit_amount > 0) <> (credit_amount > 0))
);

CREATE INDEX idx_journal_lines_account ON journal_lines(account_id);
";

const ACCOUNTING_PERIODS_SQL: &str = r"
CREATE TABLE accounting_periods (
    id UUID PRIMARY KEY,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    status VARCHAR(16) NOT NULL
        CHECK (status IN ('OPEN', 'CLOSING', 'CLOSED')),
    total_revenue NUMERIC(20, 4) NOT NULL DEFAULT 0,
    total_expense NUMERIC(20, 4) NOT NULL DEFAULT 0,
    net_income NUMERIC(20, 4) NOT NULL DEFAULT 0,
    closing_entry_id UUID REFERENCES journal_entries(id),
    description TEXT,
    closed_at TIMESTAMPTZ,
    CONSTRAINT uq_accounting_periods_end UNIQUE (end_date),
    CONSTRAINT chk_accounting_periods_range CHECK (start_date <= end_date)
);
";

const BALANCE_SNAPSHOTS_SQL: &str = r"
CREATE TABLE balance_snapshots (
    account_id UUID PRIMARY KEY REFERENCES accounts(id),
    balance NUMERIC(20, 4) NOT NULL,
    debit_total NUMERIC(20, 4) NOT NULL,
    credit_total NUMERIC(20, 4) NOT NULL,
    posted_line_count BIGINT NOT NULL CHECK (posted_line_count >= 0),
    version BIGINT NOT NULL CHECK (version > 0),
    refreshed_at TIMESTAMPTZ NOT NULL
);
";

const TRIGGERS_SQL: &str = r"
-- Journal lines are never updated or deleted
CREATE OR REPLACE FUNCTION reject_journal_line_change()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'journal lines are immutable';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_journal_lines_immutable
    BEFORE UPDATE OR DELETE ON journal_lines
    FOR EACH ROW EXECUTE FUNCTION reject_journal_line_change();

-- Only the status and reversal link of an entry may change
CREATE OR REPLACE FUNCTION guard_journal_entry_change()
RETURNS TRIGGER AS $$
BEGIN
    IF TG_OP = 'DELETE' THEN
        RAISE EXCEPTION 'journal entries cannot be deleted';
    END IF;

    IF NEW.entry_date IS DISTINCT FROM OLD.entry_date
        OR NEW.source_kind IS DISTINCT FROM OLD.source_kind
        OR NEW.source_id IS DISTINCT FROM OLD.source_id
        OR NEW.total_debit IS DISTINCT FROM OLD.total_debit
        OR NEW.total_credit IS DISTINCT FROM OLD.total_credit
        OR NEW.reverses IS DISTINCT FROM OLD.reverses THEN
        RAISE EXCEPTION 'posted journal entries are immutable';
    END IF;

    IF NEW.status IS DISTINCT FROM OLD.status
        AND NOT (OLD.status = 'POSTED' AND NEW.status = 'REVERSED') THEN
        RAISE EXCEPTION 'invalid journal entry status change: % -> %', OLD.status, NEW.status;
    END IF;

    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_journal_entries_guard
    BEFORE UPDATE OR DELETE ON journal_entries
    FOR EACH ROW EXECUTE FUNCTION guard_journal_entry_change();
";

const DROP_ALL_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_journal_entries_guard ON journal_entries;
DROP TRIGGER IF EXISTS trg_journal_lines_immutable ON journal_lines;
DROP FUNCTION IF EXISTS guard_journal_entry_change();
DROP FUNCTION IF EXISTS reject_journal_line_change();
DROP TABLE IF EXISTS balance_snapshots;
DROP TABLE IF EXISTS accounting_periods;
DROP TABLE IF EXISTS journal_lines;
DROP TABLE IF EXISTS journal_entries;
DROP TABLE IF EXISTS accounts;
";

//! Postgres-backed store implementation.
//!
//! Every invariant-bearing operation (checkout, check-in, renew, receive,
//! bulk ingest) runs in one transaction. Rows whose counters the operation
//! is about to move are locked with `SELECT ... FOR UPDATE`, so concurrent
//! calls against the same item or order serialize instead of losing updates.
//! The one-unpaid-fine-per-pair rule is enforced by a partial unique index
//! plus `ON CONFLICT DO NOTHING`, not by a prior lookup.
//!
//! SQLx errors surface as `DomainError::Store`; the transaction is rolled
//! back and never retried here.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use stacks_acquisitions::order::{NewOrderLine, Order, OrderLine, OrderStatus};
use stacks_acquisitions::receipt::{ReceiptUpdate, apply_receipt};
use stacks_catalog::item::Item;
use stacks_circulation::fine::{Fine, FineStatus};
use stacks_circulation::loan::{
    BorrowRecord, LoanStatus, effective_status, fine_for_overdue, renewed_due_date,
    validate_checkout_due_date,
};
use stacks_core::{
    BorrowerKind, BorrowerRef, CirculationPolicy, DomainError, DomainResult, FineId, Isbn, LineId,
    LoanId, OrderId,
};

use super::r#trait::{
    AcquisitionStore, Borrower, BorrowerDirectory, CatalogStore, CheckoutRequest,
    CirculationStore, FineStore, OrderSummary, ReceiveOutcome,
};

/// Schema bootstrap, applied statement by statement at startup.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS items (
        isbn             TEXT PRIMARY KEY,
        title            TEXT NOT NULL,
        author           TEXT NOT NULL,
        category         TEXT NOT NULL,
        edition          TEXT NOT NULL DEFAULT '',
        publisher        TEXT NOT NULL DEFAULT '',
        publication_year INTEGER NOT NULL,
        total_copies     BIGINT NOT NULL,
        copies_available BIGINT NOT NULL,
        CHECK (copies_available >= 0 AND copies_available <= total_copies)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS borrowers (
        kind   TEXT NOT NULL,
        id     TEXT NOT NULL,
        name   TEXT NOT NULL,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        PRIMARY KEY (kind, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS borrow_records (
        id            UUID PRIMARY KEY,
        isbn          TEXT NOT NULL,
        borrower_kind TEXT NOT NULL,
        borrower_id   TEXT NOT NULL,
        borrowed_at   TIMESTAMPTZ NOT NULL,
        due_date      TIMESTAMPTZ NOT NULL,
        status        TEXT NOT NULL,
        fine_cents    BIGINT NOT NULL DEFAULT 0,
        returned_at   TIMESTAMPTZ NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS borrow_records_pair_idx
        ON borrow_records (isbn, borrower_kind, borrower_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS fines (
        id            UUID PRIMARY KEY,
        borrower_kind TEXT NOT NULL,
        borrower_id   TEXT NOT NULL,
        isbn          TEXT NOT NULL,
        due_date      TIMESTAMPTZ NOT NULL,
        amount_cents  BIGINT NOT NULL,
        status        TEXT NOT NULL
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS fines_one_unpaid_per_pair
        ON fines (borrower_kind, borrower_id, isbn) WHERE status = 'unpaid'
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id        UUID PRIMARY KEY,
        status    TEXT NOT NULL,
        placed_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_lines (
        id                UUID PRIMARY KEY,
        order_id          UUID NOT NULL REFERENCES orders(id),
        title             TEXT NOT NULL,
        author            TEXT NOT NULL,
        isbn              TEXT NOT NULL,
        category          TEXT NOT NULL,
        edition           TEXT NOT NULL DEFAULT '',
        publisher         TEXT NOT NULL DEFAULT '',
        publication_year  INTEGER NOT NULL,
        vendor            TEXT NOT NULL DEFAULT '',
        quantity_ordered  BIGINT NOT NULL,
        quantity_received BIGINT NOT NULL DEFAULT 0,
        is_damaged        BOOLEAN NOT NULL DEFAULT FALSE,
        comments          TEXT NULL,
        CHECK (quantity_received >= 0 AND quantity_received <= quantity_ordered)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS order_lines_order_idx ON order_lines (order_id)
    "#,
];

/// Postgres-backed store.
///
/// Uses the SQLx connection pool, which is thread-safe (Arc + Send + Sync).
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
    policy: CirculationPolicy,
}

impl PostgresStore {
    pub fn new(pool: PgPool, policy: CirculationPolicy) -> Self {
        Self {
            pool: Arc::new(pool),
            policy,
        }
    }

    /// Create any missing tables and indexes.
    ///
    /// Idempotent; meant to run once at startup before the store serves
    /// requests.
    pub async fn ensure_schema(&self) -> DomainResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl BorrowerDirectory for PostgresStore {
    async fn register_borrower(&self, borrower: Borrower) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO borrowers (kind, id, name, active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (kind, id)
            DO UPDATE SET name = EXCLUDED.name, active = EXCLUDED.active
            "#,
        )
        .bind(borrower.reference.kind.as_str())
        .bind(&borrower.reference.id)
        .bind(&borrower.name)
        .bind(borrower.active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_borrower", e))?;
        Ok(())
    }

    async fn find_borrower(&self, reference: &BorrowerRef) -> DomainResult<Option<Borrower>> {
        let row = sqlx::query(
            r#"SELECT kind, id, name, active FROM borrowers WHERE kind = $1 AND id = $2"#,
        )
        .bind(reference.kind.as_str())
        .bind(&reference.id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_borrower", e))?;

        match row {
            Some(row) => {
                let decoded = BorrowerRow::from_row(&row)
                    .map_err(|e| DomainError::store(format!("failed to decode borrower row: {e}")))?;
                Ok(Some(decoded.try_into()?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CirculationStore for PostgresStore {
    #[instrument(skip(self, request), fields(isbn = %request.isbn, borrower = %request.borrower), err)]
    async fn checkout(
        &self,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<BorrowRecord> {
        validate_checkout_due_date(request.due_date, now)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_checkout", e))?;

        let borrower_row = sqlx::query(
            r#"SELECT active FROM borrowers WHERE kind = $1 AND id = $2"#,
        )
        .bind(request.borrower.kind.as_str())
        .bind(&request.borrower.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("resolve_borrower", e))?;

        let Some(borrower_row) = borrower_row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::BorrowerNotFound);
        };
        let active: bool = borrower_row
            .try_get("active")
            .map_err(|e| DomainError::store(format!("failed to read borrower row: {e}")))?;
        if !active {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::BorrowerInactive);
        }

        // Lock the item row so the availability check and the decrement are
        // one step; the last copy cannot be lent twice.
        let item_row = sqlx::query(
            r#"SELECT copies_available FROM items WHERE isbn = $1 FOR UPDATE"#,
        )
        .bind(request.isbn.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_item", e))?;

        let Some(item_row) = item_row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::not_found("item"));
        };
        let copies_available: i64 = item_row
            .try_get("copies_available")
            .map_err(|e| DomainError::store(format!("failed to read item row: {e}")))?;
        if copies_available <= 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::NotAvailable);
        }

        sqlx::query(r#"UPDATE items SET copies_available = copies_available - 1 WHERE isbn = $1"#)
            .bind(request.isbn.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("decrement_item", e))?;

        let record = BorrowRecord {
            id: LoanId::new(),
            isbn: request.isbn,
            borrower: request.borrower,
            borrowed_at: now,
            due_date: request.due_date,
            status: LoanStatus::Borrowed,
            fine_cents: 0,
            returned_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO borrow_records (
                id, isbn, borrower_kind, borrower_id,
                borrowed_at, due_date, status, fine_cents, returned_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.isbn.as_str())
        .bind(record.borrower.kind.as_str())
        .bind(&record.borrower.id)
        .bind(record.borrowed_at)
        .bind(record.due_date)
        .bind(record.status.as_str())
        .bind(record.fine_cents)
        .bind(record.returned_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_borrow_record", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_checkout", e))?;
        Ok(record)
    }

    #[instrument(skip(self, isbn, borrower), fields(isbn = %isbn, borrower = %borrower), err)]
    async fn check_in(
        &self,
        isbn: &Isbn,
        borrower: &BorrowerRef,
        now: DateTime<Utc>,
    ) -> DomainResult<BorrowRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_check_in", e))?;

        let row = sqlx::query(
            r#"
            SELECT id, isbn, borrower_kind, borrower_id,
                   borrowed_at, due_date, status, fine_cents, returned_at
            FROM borrow_records
            WHERE isbn = $1 AND borrower_kind = $2 AND borrower_id = $3
              AND status IN ('borrowed', 'overdue')
            ORDER BY borrowed_at DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(isbn.as_str())
        .bind(borrower.kind.as_str())
        .bind(&borrower.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_active_loan", e))?;

        let Some(row) = row else {
            let history = sqlx::query(
                r#"
                SELECT id FROM borrow_records
                WHERE isbn = $1 AND borrower_kind = $2 AND borrower_id = $3
                LIMIT 1
                "#,
            )
            .bind(isbn.as_str())
            .bind(borrower.kind.as_str())
            .bind(&borrower.id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_loan_history", e))?;

            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(if history.is_some() {
                DomainError::AlreadyReturned
            } else {
                DomainError::NoActiveLoan
            });
        };

        let mut record: BorrowRecord = BorrowRecordRow::from_row(&row)
            .map_err(|e| DomainError::store(format!("failed to decode borrow record row: {e}")))?
            .try_into()?;

        // Overdue loans are reclassified and fined inside the same
        // transaction that finalizes them.
        if record.due_date < now {
            record.fine_cents = fine_for_overdue(&self.policy, record.due_date, now);
            let fine_id = FineId::new();
            sqlx::query(
                r#"
                INSERT INTO fines (
                    id, borrower_kind, borrower_id, isbn, due_date, amount_cents, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, 'unpaid')
                ON CONFLICT (borrower_kind, borrower_id, isbn) WHERE status = 'unpaid'
                DO NOTHING
                "#,
            )
            .bind(fine_id.as_uuid())
            .bind(record.borrower.kind.as_str())
            .bind(&record.borrower.id)
            .bind(record.isbn.as_str())
            .bind(record.due_date)
            .bind(record.fine_cents)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_fine", e))?;
        }

        record.status = LoanStatus::Returned;
        record.returned_at = Some(now);

        sqlx::query(
            r#"
            UPDATE borrow_records
            SET status = 'returned', returned_at = $2, fine_cents = $3
            WHERE id = $1
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(now)
        .bind(record.fine_cents)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("finalize_loan", e))?;

        sqlx::query(r#"UPDATE items SET copies_available = copies_available + 1 WHERE isbn = $1"#)
            .bind(record.isbn.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("increment_item", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_check_in", e))?;
        Ok(record)
    }

    #[instrument(skip(self), fields(loan_id = %loan_id), err)]
    async fn renew(&self, loan_id: LoanId) -> DomainResult<BorrowRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_renew", e))?;

        let row = sqlx::query(
            r#"
            SELECT id, isbn, borrower_kind, borrower_id,
                   borrowed_at, due_date, status, fine_cents, returned_at
            FROM borrow_records
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(loan_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_loan", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::not_found("loan record"));
        };

        let mut record: BorrowRecord = BorrowRecordRow::from_row(&row)
            .map_err(|e| DomainError::store(format!("failed to decode borrow record row: {e}")))?
            .try_into()?;

        if record.status == LoanStatus::Returned {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::AlreadyReturned);
        }

        record.due_date = renewed_due_date(record.due_date, &self.policy);

        sqlx::query(r#"UPDATE borrow_records SET due_date = $2 WHERE id = $1"#)
            .bind(record.id.as_uuid())
            .bind(record.due_date)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("extend_due_date", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_renew", e))?;
        Ok(record)
    }

    async fn list_active_loans(
        &self,
        borrower: Option<&BorrowerRef>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<BorrowRecord>> {
        let kind_param: Option<&str> = borrower.map(|b| b.kind.as_str());
        let id_param: Option<&str> = borrower.map(|b| b.id.as_str());

        let rows = sqlx::query(
            r#"
            SELECT id, isbn, borrower_kind, borrower_id,
                   borrowed_at, due_date, status, fine_cents, returned_at
            FROM borrow_records
            WHERE status IN ('borrowed', 'overdue')
              AND ($1::text IS NULL OR borrower_kind = $1)
              AND ($2::text IS NULL OR borrower_id = $2)
            ORDER BY borrowed_at ASC
            "#,
        )
        .bind(kind_param)
        .bind(id_param)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_active_loans", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record: BorrowRecord = BorrowRecordRow::from_row(&row)
                .map_err(|e| {
                    DomainError::store(format!("failed to decode borrow record row: {e}"))
                })?
                .try_into()?;
            let status = effective_status(&record, now);
            records.push(BorrowRecord { status, ..record });
        }
        Ok(records)
    }
}

#[async_trait]
impl FineStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn scan_and_accrue(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let rows = sqlx::query(
            r#"
            SELECT r.borrower_kind, r.borrower_id, r.isbn, r.due_date
            FROM borrow_records r
            WHERE r.status IN ('borrowed', 'overdue') AND r.due_date < $1
              AND NOT EXISTS (
                  SELECT 1 FROM fines f
                  WHERE f.borrower_kind = r.borrower_kind
                    AND f.borrower_id = r.borrower_id
                    AND f.isbn = r.isbn
                    AND f.status = 'unpaid'
              )
            "#,
        )
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("scan_overdue_loans", e))?;

        let mut inserted = 0u64;
        for row in rows {
            let borrower_kind: String = row
                .try_get("borrower_kind")
                .map_err(|e| DomainError::store(format!("failed to read overdue row: {e}")))?;
            let borrower_id: String = row
                .try_get("borrower_id")
                .map_err(|e| DomainError::store(format!("failed to read overdue row: {e}")))?;
            let isbn: String = row
                .try_get("isbn")
                .map_err(|e| DomainError::store(format!("failed to read overdue row: {e}")))?;
            let due_date: DateTime<Utc> = row
                .try_get("due_date")
                .map_err(|e| DomainError::store(format!("failed to read overdue row: {e}")))?;

            let amount_cents = fine_for_overdue(&self.policy, due_date, now);
            let fine_id = FineId::new();

            // The partial unique index arbitrates concurrent scans; a loser
            // inserts nothing and that is the desired outcome.
            let result = sqlx::query(
                r#"
                INSERT INTO fines (
                    id, borrower_kind, borrower_id, isbn, due_date, amount_cents, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, 'unpaid')
                ON CONFLICT (borrower_kind, borrower_id, isbn) WHERE status = 'unpaid'
                DO NOTHING
                "#,
            )
            .bind(fine_id.as_uuid())
            .bind(&borrower_kind)
            .bind(&borrower_id)
            .bind(&isbn)
            .bind(due_date)
            .bind(amount_cents)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_fine", e))?;

            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn list_unpaid(&self, now: DateTime<Utc>) -> DomainResult<Vec<Fine>> {
        self.scan_and_accrue(now).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, borrower_kind, borrower_id, isbn, due_date, amount_cents, status
            FROM fines
            WHERE status = 'unpaid'
            ORDER BY due_date ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_unpaid", e))?;

        let mut fines = Vec::with_capacity(rows.len());
        for row in rows {
            let fine: Fine = FineRow::from_row(&row)
                .map_err(|e| DomainError::store(format!("failed to decode fine row: {e}")))?
                .try_into()?;
            fines.push(fine);
        }
        Ok(fines)
    }

    #[instrument(skip(self), fields(fine_id = %fine_id), err)]
    async fn mark_paid(&self, fine_id: FineId) -> DomainResult<Fine> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_mark_paid", e))?;

        let row = sqlx::query(
            r#"
            SELECT id, borrower_kind, borrower_id, isbn, due_date, amount_cents, status
            FROM fines
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(fine_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("find_fine", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::not_found("fine"));
        };

        let mut fine: Fine = FineRow::from_row(&row)
            .map_err(|e| DomainError::store(format!("failed to decode fine row: {e}")))?
            .try_into()?;

        if fine.status == FineStatus::Paid {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::AlreadyPaid);
        }

        sqlx::query(r#"UPDATE fines SET status = 'paid' WHERE id = $1"#)
            .bind(fine.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("settle_fine", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_mark_paid", e))?;

        fine.status = FineStatus::Paid;
        Ok(fine)
    }
}

#[async_trait]
impl AcquisitionStore for PostgresStore {
    #[instrument(skip(self, lines), fields(line_count = lines.len()), err)]
    async fn create_order(
        &self,
        lines: Vec<NewOrderLine>,
        now: DateTime<Utc>,
    ) -> DomainResult<(Order, Vec<OrderLine>)> {
        if lines.is_empty() {
            return Err(DomainError::EmptyOrder);
        }
        for line in &lines {
            line.validate()?;
        }

        let order = Order {
            id: OrderId::new(),
            status: OrderStatus::Pending,
            placed_at: now,
        };
        let stored: Vec<OrderLine> = lines.into_iter().map(|l| l.into_line(order.id)).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_create_order", e))?;

        sqlx::query(r#"INSERT INTO orders (id, status, placed_at) VALUES ($1, $2, $3)"#)
            .bind(order.id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.placed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;

        for line in &stored {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    id, order_id, title, author, isbn, category, edition, publisher,
                    publication_year, vendor, quantity_ordered, quantity_received,
                    is_damaged, comments
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(line.order_id.as_uuid())
            .bind(&line.title)
            .bind(&line.author)
            .bind(line.isbn.as_str())
            .bind(&line.category)
            .bind(&line.edition)
            .bind(&line.publisher)
            .bind(line.publication_year)
            .bind(&line.vendor)
            .bind(line.quantity_ordered)
            .bind(line.quantity_received)
            .bind(line.is_damaged)
            .bind(&line.comments)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_line", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_create_order", e))?;
        Ok((order, stored))
    }

    async fn list_orders(&self) -> DomainResult<Vec<OrderSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.status, o.placed_at, COUNT(l.id) AS line_count
            FROM orders o
            LEFT JOIN order_lines l ON l.order_id = o.id
            GROUP BY o.id, o.status, o.placed_at
            ORDER BY o.placed_at DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_orders", e))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let summary: OrderSummary = OrderSummaryRow::from_row(&row)
                .map_err(|e| DomainError::store(format!("failed to decode order row: {e}")))?
                .try_into()?;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    async fn order_lines(&self, order_id: OrderId) -> DomainResult<Vec<OrderLine>> {
        let order = sqlx::query(r#"SELECT id FROM orders WHERE id = $1"#)
            .bind(order_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_order", e))?;
        if order.is_none() {
            return Err(DomainError::not_found("order"));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, order_id, title, author, isbn, category, edition, publisher,
                   publication_year, vendor, quantity_ordered, quantity_received,
                   is_damaged, comments
            FROM order_lines
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_order_lines", e))?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let line: OrderLine = OrderLineRow::from_row(&row)
                .map_err(|e| DomainError::store(format!("failed to decode order line row: {e}")))?
                .try_into()?;
            lines.push(line);
        }
        Ok(lines)
    }

    #[instrument(skip(self, updates, comments), fields(order_id = %order_id, update_count = updates.len()), err)]
    async fn receive(
        &self,
        order_id: OrderId,
        updates: Vec<ReceiptUpdate>,
        comments: Option<String>,
    ) -> DomainResult<ReceiveOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_receive", e))?;

        // Lock the order header first; concurrent receives against the same
        // order serialize here.
        let order_row = sqlx::query(r#"SELECT id FROM orders WHERE id = $1 FOR UPDATE"#)
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?;
        if order_row.is_none() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::not_found("order"));
        }

        let mut promoted: Vec<Isbn> = Vec::new();
        for update in &updates {
            let row = sqlx::query(
                r#"
                SELECT id, order_id, title, author, isbn, category, edition, publisher,
                       publication_year, vendor, quantity_ordered, quantity_received,
                       is_damaged, comments
                FROM order_lines
                WHERE id = $1 AND order_id = $2
                FOR UPDATE
                "#,
            )
            .bind(update.line_id.as_uuid())
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order_line", e))?;

            let Some(row) = row else {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(DomainError::not_found("order line"));
            };

            let line: OrderLine = OrderLineRow::from_row(&row)
                .map_err(|e| DomainError::store(format!("failed to decode order line row: {e}")))?
                .try_into()?;

            let outcome = match apply_receipt(&line, update.quantity_delta) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tx.rollback()
                        .await
                        .map_err(|e| map_sqlx_error("rollback", e))?;
                    return Err(err);
                }
            };

            sqlx::query(
                r#"
                UPDATE order_lines
                SET quantity_received = $2, is_damaged = $3, comments = COALESCE($4, comments)
                WHERE id = $1
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(outcome.new_received)
            .bind(update.is_damaged)
            .bind(&comments)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_order_line", e))?;

            if outcome.completed_now {
                // Promotion happens in the same transaction as the crossing
                // delivery, exactly once per line.
                sqlx::query(
                    r#"
                    INSERT INTO items (
                        isbn, title, author, category, edition, publisher,
                        publication_year, total_copies, copies_available
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
                    ON CONFLICT (isbn) DO UPDATE SET
                        total_copies = items.total_copies + EXCLUDED.total_copies,
                        copies_available = items.copies_available + EXCLUDED.copies_available
                    "#,
                )
                .bind(line.isbn.as_str())
                .bind(&line.title)
                .bind(&line.author)
                .bind(&line.category)
                .bind(&line.edition)
                .bind(&line.publisher)
                .bind(line.publication_year)
                .bind(line.quantity_ordered)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("promote_line", e))?;

                promoted.push(line.isbn.clone());
            }
        }

        let (line_count, ordered_sum, received_sum) = order_totals(&mut tx, order_id).await?;
        let status = if line_count > 0 && ordered_sum == received_sum {
            sqlx::query(r#"UPDATE orders SET status = 'received' WHERE id = $1"#)
                .bind(order_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("complete_order", e))?;
            OrderStatus::Received
        } else {
            OrderStatus::Pending
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_receive", e))?;
        Ok(ReceiveOutcome { status, promoted })
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, items), fields(item_count = items.len()), err)]
    async fn add_items(&self, items: Vec<Item>) -> DomainResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_add_items", e))?;

        let mut duplicates: Vec<String> = Vec::new();
        for item in &items {
            let existing = sqlx::query(r#"SELECT isbn FROM items WHERE isbn = $1"#)
                .bind(item.isbn.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("check_catalog_duplicate", e))?;
            if existing.is_some() {
                duplicates.push(item.isbn.to_string());
            }
        }
        if !duplicates.is_empty() {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(DomainError::DuplicateIsbn(duplicates));
        }

        let count = items.len() as u64;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO items (
                    isbn, title, author, category, edition, publisher,
                    publication_year, total_copies, copies_available
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(item.isbn.as_str())
            .bind(&item.title)
            .bind(&item.author)
            .bind(&item.category)
            .bind(&item.edition)
            .bind(&item.publisher)
            .bind(item.publication_year)
            .bind(item.total_copies)
            .bind(item.copies_available)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A racing upload can slip past the pre-check; the primary
                // key reports it as a duplicate rather than a plain failure.
                if is_unique_violation(&e) {
                    DomainError::DuplicateIsbn(vec![item.isbn.to_string()])
                } else {
                    map_sqlx_error("insert_item", e)
                }
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_add_items", e))?;
        Ok(count)
    }

    async fn get_item(&self, isbn: &Isbn) -> DomainResult<Option<Item>> {
        let row = sqlx::query(
            r#"
            SELECT isbn, title, author, category, edition, publisher,
                   publication_year, total_copies, copies_available
            FROM items
            WHERE isbn = $1
            "#,
        )
        .bind(isbn.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_item", e))?;

        match row {
            Some(row) => {
                let item: Item = ItemRow::from_row(&row)
                    .map_err(|e| DomainError::store(format!("failed to decode item row: {e}")))?
                    .try_into()?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

/// Line count and quantity sums for one order.
async fn order_totals(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
) -> DomainResult<(i64, i64, i64)> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS line_count,
               COALESCE(SUM(quantity_ordered), 0) AS ordered_sum,
               COALESCE(SUM(quantity_received), 0) AS received_sum
        FROM order_lines
        WHERE order_id = $1
        "#,
    )
    .bind(order_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("order_totals", e))?;

    let line_count: i64 = row
        .try_get("line_count")
        .map_err(|e| DomainError::store(format!("failed to read order totals: {e}")))?;
    let ordered_sum: i64 = row
        .try_get("ordered_sum")
        .map_err(|e| DomainError::store(format!("failed to read order totals: {e}")))?;
    let received_sum: i64 = row
        .try_get("received_sum")
        .map_err(|e| DomainError::store(format!("failed to read order totals: {e}")))?;
    Ok((line_count, ordered_sum, received_sum))
}

/// Map SQLx errors onto the domain's storage error.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => DomainError::store(format!(
            "database error in {}: {}",
            operation,
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            DomainError::store(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            DomainError::store(format!("unexpected row not found in {operation}"))
        }
        _ => DomainError::store(format!("sqlx error in {operation}: {err}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn parse_stored_isbn(raw: &str) -> DomainResult<Isbn> {
    raw.parse()
        .map_err(|e: DomainError| DomainError::store(format!("corrupt isbn in row: {e}")))
}

fn parse_stored_borrower(kind: &str, id: String) -> DomainResult<BorrowerRef> {
    let kind: BorrowerKind = kind
        .parse()
        .map_err(|e: DomainError| DomainError::store(format!("corrupt borrower kind: {e}")))?;
    BorrowerRef::new(kind, id)
        .map_err(|e| DomainError::store(format!("corrupt borrower id: {e}")))
}

// SQLx row types

#[derive(Debug)]
struct BorrowerRow {
    kind: String,
    id: String,
    name: String,
    active: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for BorrowerRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(BorrowerRow {
            kind: row.try_get("kind")?,
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            active: row.try_get("active")?,
        })
    }
}

impl TryFrom<BorrowerRow> for Borrower {
    type Error = DomainError;

    fn try_from(row: BorrowerRow) -> Result<Self, Self::Error> {
        Ok(Borrower {
            reference: parse_stored_borrower(&row.kind, row.id)?,
            name: row.name,
            active: row.active,
        })
    }
}

#[derive(Debug)]
struct BorrowRecordRow {
    id: uuid::Uuid,
    isbn: String,
    borrower_kind: String,
    borrower_id: String,
    borrowed_at: DateTime<Utc>,
    due_date: DateTime<Utc>,
    status: String,
    fine_cents: i64,
    returned_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for BorrowRecordRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(BorrowRecordRow {
            id: row.try_get("id")?,
            isbn: row.try_get("isbn")?,
            borrower_kind: row.try_get("borrower_kind")?,
            borrower_id: row.try_get("borrower_id")?,
            borrowed_at: row.try_get("borrowed_at")?,
            due_date: row.try_get("due_date")?,
            status: row.try_get("status")?,
            fine_cents: row.try_get("fine_cents")?,
            returned_at: row.try_get("returned_at")?,
        })
    }
}

impl TryFrom<BorrowRecordRow> for BorrowRecord {
    type Error = DomainError;

    fn try_from(row: BorrowRecordRow) -> Result<Self, Self::Error> {
        Ok(BorrowRecord {
            id: LoanId::from_uuid(row.id),
            isbn: parse_stored_isbn(&row.isbn)?,
            borrower: parse_stored_borrower(&row.borrower_kind, row.borrower_id)?,
            borrowed_at: row.borrowed_at,
            due_date: row.due_date,
            status: row
                .status
                .parse()
                .map_err(|e: DomainError| DomainError::store(format!("corrupt loan status: {e}")))?,
            fine_cents: row.fine_cents,
            returned_at: row.returned_at,
        })
    }
}

#[derive(Debug)]
struct FineRow {
    id: uuid::Uuid,
    borrower_kind: String,
    borrower_id: String,
    isbn: String,
    due_date: DateTime<Utc>,
    amount_cents: i64,
    status: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for FineRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(FineRow {
            id: row.try_get("id")?,
            borrower_kind: row.try_get("borrower_kind")?,
            borrower_id: row.try_get("borrower_id")?,
            isbn: row.try_get("isbn")?,
            due_date: row.try_get("due_date")?,
            amount_cents: row.try_get("amount_cents")?,
            status: row.try_get("status")?,
        })
    }
}

impl TryFrom<FineRow> for Fine {
    type Error = DomainError;

    fn try_from(row: FineRow) -> Result<Self, Self::Error> {
        Ok(Fine {
            id: FineId::from_uuid(row.id),
            borrower: parse_stored_borrower(&row.borrower_kind, row.borrower_id)?,
            isbn: parse_stored_isbn(&row.isbn)?,
            due_date: row.due_date,
            amount_cents: row.amount_cents,
            status: row
                .status
                .parse()
                .map_err(|e: DomainError| DomainError::store(format!("corrupt fine status: {e}")))?,
        })
    }
}

#[derive(Debug)]
struct OrderSummaryRow {
    id: uuid::Uuid,
    status: String,
    placed_at: DateTime<Utc>,
    line_count: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for OrderSummaryRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderSummaryRow {
            id: row.try_get("id")?,
            status: row.try_get("status")?,
            placed_at: row.try_get("placed_at")?,
            line_count: row.try_get("line_count")?,
        })
    }
}

impl TryFrom<OrderSummaryRow> for OrderSummary {
    type Error = DomainError;

    fn try_from(row: OrderSummaryRow) -> Result<Self, Self::Error> {
        Ok(OrderSummary {
            id: OrderId::from_uuid(row.id),
            status: row
                .status
                .parse()
                .map_err(|e: DomainError| {
                    DomainError::store(format!("corrupt order status: {e}"))
                })?,
            placed_at: row.placed_at,
            line_count: row.line_count,
        })
    }
}

#[derive(Debug)]
struct OrderLineRow {
    id: uuid::Uuid,
    order_id: uuid::Uuid,
    title: String,
    author: String,
    isbn: String,
    category: String,
    edition: String,
    publisher: String,
    publication_year: i32,
    vendor: String,
    quantity_ordered: i64,
    quantity_received: i64,
    is_damaged: bool,
    comments: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for OrderLineRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderLineRow {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            isbn: row.try_get("isbn")?,
            category: row.try_get("category")?,
            edition: row.try_get("edition")?,
            publisher: row.try_get("publisher")?,
            publication_year: row.try_get("publication_year")?,
            vendor: row.try_get("vendor")?,
            quantity_ordered: row.try_get("quantity_ordered")?,
            quantity_received: row.try_get("quantity_received")?,
            is_damaged: row.try_get("is_damaged")?,
            comments: row.try_get("comments")?,
        })
    }
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = DomainError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        Ok(OrderLine {
            id: LineId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            title: row.title,
            author: row.author,
            isbn: parse_stored_isbn(&row.isbn)?,
            category: row.category,
            edition: row.edition,
            publisher: row.publisher,
            publication_year: row.publication_year,
            vendor: row.vendor,
            quantity_ordered: row.quantity_ordered,
            quantity_received: row.quantity_received,
            is_damaged: row.is_damaged,
            comments: row.comments,
        })
    }
}

#[derive(Debug)]
struct ItemRow {
    isbn: String,
    title: String,
    author: String,
    category: String,
    edition: String,
    publisher: String,
    publication_year: i32,
    total_copies: i64,
    copies_available: i64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ItemRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow {
            isbn: row.try_get("isbn")?,
            title: row.try_get("title")?,
            author: row.try_get("author")?,
            category: row.try_get("category")?,
            edition: row.try_get("edition")?,
            publisher: row.try_get("publisher")?,
            publication_year: row.try_get("publication_year")?,
            total_copies: row.try_get("total_copies")?,
            copies_available: row.try_get("copies_available")?,
        })
    }
}

impl TryFrom<ItemRow> for Item {
    type Error = DomainError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Item {
            isbn: parse_stored_isbn(&row.isbn)?,
            title: row.title,
            author: row.author,
            category: row.category,
            edition: row.edition,
            publisher: row.publisher,
            publication_year: row.publication_year,
            total_copies: row.total_copies,
            copies_available: row.copies_available,
        })
    }
}

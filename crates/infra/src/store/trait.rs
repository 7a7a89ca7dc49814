use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stacks_acquisitions::order::{NewOrderLine, Order, OrderLine, OrderStatus};
use stacks_acquisitions::receipt::ReceiptUpdate;
use stacks_catalog::item::Item;
use stacks_circulation::fine::Fine;
use stacks_circulation::loan::BorrowRecord;
use stacks_core::{BorrowerRef, DomainResult, FineId, Isbn, LoanId, OrderId};

/// Directory entry for a borrower.
///
/// Borrower identity is owned by an external system; this record is the shim
/// the store keeps so checkout can resolve and gate on it. Entries are seeded
/// out-of-band (wiring, tests); there is no public CRUD surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Borrower {
    pub reference: BorrowerRef,
    pub name: String,
    pub active: bool,
}

/// Checkout input, validated at the boundary before any row is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub isbn: Isbn,
    pub borrower: BorrowerRef,
    pub due_date: DateTime<Utc>,
}

/// Result of one receive call against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveOutcome {
    /// Order status after the call (Received once every line is full).
    pub status: OrderStatus,
    /// ISBNs promoted into the catalog by this call, in update order.
    pub promoted: Vec<Isbn>,
}

/// Order header plus line count, the order-listing view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub line_count: i64,
}

/// Borrower directory shim.
#[async_trait]
pub trait BorrowerDirectory: Send + Sync {
    /// Insert or replace a directory entry.
    async fn register_borrower(&self, borrower: Borrower) -> DomainResult<()>;

    async fn find_borrower(&self, reference: &BorrowerRef) -> DomainResult<Option<Borrower>>;
}

/// Borrowing lifecycle operations.
///
/// ## Atomicity
///
/// Every method is one logical operation: implementations must apply the full
/// read-check-mutate sequence atomically (a transaction with row locks in
/// Postgres, a single write lock in memory). Partial application must not be
/// observable, and a failed operation must leave no trace.
///
/// ## Clock
///
/// `now` is threaded in from the caller so overdue evaluation and accrual are
/// deterministic under test.
#[async_trait]
pub trait CirculationStore: Send + Sync {
    /// Lend one copy.
    ///
    /// Fails with `Validation` for a past due date, `BorrowerNotFound` /
    /// `BorrowerInactive` when the borrower cannot act, `NotFound` for an
    /// uncataloged item, and `NotAvailable` when no copy remains. On success
    /// the item's available count is down one and a Borrowed record exists.
    /// Two simultaneous checkouts of the last copy must not both succeed.
    async fn checkout(
        &self,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<BorrowRecord>;

    /// Return the active loan for an (item, borrower) pair.
    ///
    /// A loan past its due date is reclassified and its fine accrued before
    /// the record is finalized; the returned record carries the assessed
    /// `fine_cents`. Re-returning reports `AlreadyReturned` and never
    /// increments availability a second time; `NoActiveLoan` when the pair
    /// has no loan history at all.
    async fn check_in(
        &self,
        isbn: &Isbn,
        borrower: &BorrowerRef,
        now: DateTime<Utc>,
    ) -> DomainResult<BorrowRecord>;

    /// Extend a loan's due date by the policy's renewal interval.
    ///
    /// Works from the current due date even when the loan is already
    /// overdue; status and accrued fines are untouched. `AlreadyReturned`
    /// for a terminal record.
    async fn renew(&self, loan_id: LoanId) -> DomainResult<BorrowRecord>;

    /// Loans whose effective status at `now` is Borrowed or Overdue,
    /// optionally filtered to one borrower. The returned records carry the
    /// effective status, not the stored column.
    async fn list_active_loans(
        &self,
        borrower: Option<&BorrowerRef>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<BorrowRecord>>;
}

/// Fine ledger operations.
#[async_trait]
pub trait FineStore: Send + Sync {
    /// Insert an unpaid fine for every overdue active loan that does not
    /// already have one for its (borrower, item) pair. Idempotent; returns
    /// the number of fines inserted. Concurrent scans must not double-fine
    /// a pair.
    async fn scan_and_accrue(&self, now: DateTime<Utc>) -> DomainResult<u64>;

    /// Run an accrual pass, then list unpaid fines ordered by due date.
    async fn list_unpaid(&self, now: DateTime<Utc>) -> DomainResult<Vec<Fine>>;

    /// Settle a fine in full. `AlreadyPaid` on a second invocation.
    async fn mark_paid(&self, fine_id: FineId) -> DomainResult<Fine>;
}

/// Purchase order and receiving operations.
#[async_trait]
pub trait AcquisitionStore: Send + Sync {
    /// Create a Pending order with one line per input, nothing received.
    /// `EmptyOrder` when no lines are supplied.
    async fn create_order(
        &self,
        lines: Vec<NewOrderLine>,
        now: DateTime<Utc>,
    ) -> DomainResult<(Order, Vec<OrderLine>)>;

    async fn list_orders(&self) -> DomainResult<Vec<OrderSummary>>;

    /// Lines of one order. `NotFound` for an unknown order.
    async fn order_lines(&self, order_id: OrderId) -> DomainResult<Vec<OrderLine>>;

    /// Reconcile a delivery against an order.
    ///
    /// Applies each update as a server-side increment (never an absolute
    /// overwrite), rejecting negative deltas and over-receipt. A line
    /// crossing from incomplete to complete is promoted into the catalog in
    /// the same transaction, exactly once. After all updates, the order
    /// flips to Received iff the received sum equals the ordered sum. Any
    /// failure rolls the whole call back.
    async fn receive(
        &self,
        order_id: OrderId,
        updates: Vec<ReceiptUpdate>,
        comments: Option<String>,
    ) -> DomainResult<ReceiveOutcome>;
}

/// Catalog persistence.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All-or-nothing insert of a prepared batch. Any ISBN already cataloged
    /// rejects the whole batch with the duplicate list; on success returns
    /// the number of items added.
    async fn add_items(&self, items: Vec<Item>) -> DomainResult<u64>;

    async fn get_item(&self, isbn: &Isbn) -> DomainResult<Option<Item>>;
}

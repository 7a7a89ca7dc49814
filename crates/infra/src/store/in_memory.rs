use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stacks_acquisitions::order::{NewOrderLine, Order, OrderLine, OrderStatus};
use stacks_acquisitions::receipt::{ReceiptUpdate, apply_receipt, order_complete};
use stacks_catalog::item::Item;
use stacks_circulation::fine::{Fine, FineStatus};
use stacks_circulation::loan::{
    BorrowRecord, LoanStatus, effective_status, fine_for_overdue, renewed_due_date,
    validate_checkout_due_date,
};
use stacks_core::{
    BorrowerRef, CirculationPolicy, DomainError, DomainResult, FineId, Isbn, LoanId, OrderId,
};

use super::r#trait::{
    AcquisitionStore, Borrower, BorrowerDirectory, CatalogStore, CheckoutRequest,
    CirculationStore, FineStore, OrderSummary, ReceiveOutcome,
};

#[derive(Debug, Default)]
struct State {
    items: HashMap<Isbn, Item>,
    borrowers: HashMap<BorrowerRef, Borrower>,
    loans: Vec<BorrowRecord>,
    fines: Vec<Fine>,
    orders: Vec<Order>,
    order_lines: Vec<OrderLine>,
}

/// In-memory store.
///
/// Intended for dev/test. One lock guards all state, so every operation is
/// fully serialized; the observable semantics match the Postgres store's
/// transactional ones.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    policy: CirculationPolicy,
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new(policy: CirculationPolicy) -> Self {
        Self {
            policy,
            state: RwLock::default(),
        }
    }

    fn read_state(&self) -> DomainResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| DomainError::store("lock poisoned"))
    }

    fn write_state(&self) -> DomainResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| DomainError::store("lock poisoned"))
    }
}

/// Insert an unpaid fine unless the (borrower, item) pair already has one.
/// The in-memory stand-in for the partial unique index.
fn insert_fine_if_absent(state: &mut State, fine: Fine) -> bool {
    let exists = state.fines.iter().any(|f| {
        f.status == FineStatus::Unpaid && f.borrower == fine.borrower && f.isbn == fine.isbn
    });
    if exists {
        return false;
    }
    state.fines.push(fine);
    true
}

fn scan_locked(state: &mut State, policy: &CirculationPolicy, now: DateTime<Utc>) -> u64 {
    let candidates: Vec<(BorrowerRef, Isbn, DateTime<Utc>)> = state
        .loans
        .iter()
        .filter(|r| r.is_active() && r.due_date < now)
        .map(|r| (r.borrower.clone(), r.isbn.clone(), r.due_date))
        .collect();

    let mut inserted = 0;
    for (borrower, isbn, due_date) in candidates {
        let fine = Fine {
            id: FineId::new(),
            borrower,
            isbn,
            due_date,
            amount_cents: fine_for_overdue(policy, due_date, now),
            status: FineStatus::Unpaid,
        };
        if insert_fine_if_absent(state, fine) {
            inserted += 1;
        }
    }
    inserted
}

/// Add a completed line's ordered quantity to the catalog, creating the item
/// from the line's metadata when it is not cataloged yet.
fn promote_locked(state: &mut State, line: &OrderLine) {
    match state.items.get_mut(&line.isbn) {
        Some(item) => {
            item.total_copies += line.quantity_ordered;
            item.copies_available += line.quantity_ordered;
        }
        None => {
            state.items.insert(
                line.isbn.clone(),
                Item {
                    isbn: line.isbn.clone(),
                    title: line.title.clone(),
                    author: line.author.clone(),
                    category: line.category.clone(),
                    edition: line.edition.clone(),
                    publisher: line.publisher.clone(),
                    publication_year: line.publication_year,
                    total_copies: line.quantity_ordered,
                    copies_available: line.quantity_ordered,
                },
            );
        }
    }
}

#[async_trait]
impl BorrowerDirectory for InMemoryStore {
    async fn register_borrower(&self, borrower: Borrower) -> DomainResult<()> {
        let mut state = self.write_state()?;
        state.borrowers.insert(borrower.reference.clone(), borrower);
        Ok(())
    }

    async fn find_borrower(&self, reference: &BorrowerRef) -> DomainResult<Option<Borrower>> {
        let state = self.read_state()?;
        Ok(state.borrowers.get(reference).cloned())
    }
}

#[async_trait]
impl CirculationStore for InMemoryStore {
    async fn checkout(
        &self,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> DomainResult<BorrowRecord> {
        validate_checkout_due_date(request.due_date, now)?;

        let mut state = self.write_state()?;

        let entry = state
            .borrowers
            .get(&request.borrower)
            .ok_or(DomainError::BorrowerNotFound)?;
        if !entry.active {
            return Err(DomainError::BorrowerInactive);
        }

        let item = state
            .items
            .get_mut(&request.isbn)
            .ok_or_else(|| DomainError::not_found("item"))?;
        if item.copies_available <= 0 {
            return Err(DomainError::NotAvailable);
        }
        item.copies_available -= 1;

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
        state.loans.push(record.clone());
        Ok(record)
    }

    async fn check_in(
        &self,
        isbn: &Isbn,
        borrower: &BorrowerRef,
        now: DateTime<Utc>,
    ) -> DomainResult<BorrowRecord> {
        let mut state = self.write_state()?;

        let pos = state
            .loans
            .iter()
            .rposition(|r| r.isbn == *isbn && r.borrower == *borrower && r.is_active());
        let Some(pos) = pos else {
            let has_history = state
                .loans
                .iter()
                .any(|r| r.isbn == *isbn && r.borrower == *borrower);
            return Err(if has_history {
                DomainError::AlreadyReturned
            } else {
                DomainError::NoActiveLoan
            });
        };

        let due_date = state.loans[pos].due_date;
        let overdue = due_date < now;
        if overdue {
            let fine_cents = fine_for_overdue(&self.policy, due_date, now);
            state.loans[pos].fine_cents = fine_cents;
            insert_fine_if_absent(
                &mut state,
                Fine {
                    id: FineId::new(),
                    borrower: borrower.clone(),
                    isbn: isbn.clone(),
                    due_date,
                    amount_cents: fine_cents,
                    status: FineStatus::Unpaid,
                },
            );
        }

        state.loans[pos].status = LoanStatus::Returned;
        state.loans[pos].returned_at = Some(now);

        if let Some(item) = state.items.get_mut(isbn) {
            item.copies_available += 1;
        }

        Ok(state.loans[pos].clone())
    }

    async fn renew(&self, loan_id: LoanId) -> DomainResult<BorrowRecord> {
        let mut state = self.write_state()?;

        let record = state
            .loans
            .iter_mut()
            .find(|r| r.id == loan_id)
            .ok_or_else(|| DomainError::not_found("loan record"))?;
        if record.status == LoanStatus::Returned {
            return Err(DomainError::AlreadyReturned);
        }

        record.due_date = renewed_due_date(record.due_date, &self.policy);
        Ok(record.clone())
    }

    async fn list_active_loans(
        &self,
        borrower: Option<&BorrowerRef>,
        now: DateTime<Utc>,
    ) -> DomainResult<Vec<BorrowRecord>> {
        let state = self.read_state()?;
        Ok(state
            .loans
            .iter()
            .filter(|r| r.is_active())
            .filter(|r| borrower.is_none_or(|b| r.borrower == *b))
            .map(|r| {
                let mut view = r.clone();
                view.status = effective_status(r, now);
                view
            })
            .collect())
    }
}

#[async_trait]
impl FineStore for InMemoryStore {
    async fn scan_and_accrue(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let mut state = self.write_state()?;
        Ok(scan_locked(&mut state, &self.policy, now))
    }

    async fn list_unpaid(&self, now: DateTime<Utc>) -> DomainResult<Vec<Fine>> {
        let mut state = self.write_state()?;
        scan_locked(&mut state, &self.policy, now);

        let mut fines: Vec<Fine> = state
            .fines
            .iter()
            .filter(|f| f.status == FineStatus::Unpaid)
            .cloned()
            .collect();
        fines.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(fines)
    }

    async fn mark_paid(&self, fine_id: FineId) -> DomainResult<Fine> {
        let mut state = self.write_state()?;

        let fine = state
            .fines
            .iter_mut()
            .find(|f| f.id == fine_id)
            .ok_or_else(|| DomainError::not_found("fine"))?;
        if fine.status == FineStatus::Paid {
            return Err(DomainError::AlreadyPaid);
        }

        fine.status = FineStatus::Paid;
        Ok(fine.clone())
    }
}

#[async_trait]
impl AcquisitionStore for InMemoryStore {
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

        let mut state = self.write_state()?;
        state.orders.push(order.clone());
        state.order_lines.extend(stored.iter().cloned());
        Ok((order, stored))
    }

    async fn list_orders(&self) -> DomainResult<Vec<OrderSummary>> {
        let state = self.read_state()?;
        let mut summaries: Vec<OrderSummary> = state
            .orders
            .iter()
            .map(|o| OrderSummary {
                id: o.id,
                status: o.status,
                placed_at: o.placed_at,
                line_count: state.order_lines.iter().filter(|l| l.order_id == o.id).count()
                    as i64,
            })
            .collect();
        summaries.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        Ok(summaries)
    }

    async fn order_lines(&self, order_id: OrderId) -> DomainResult<Vec<OrderLine>> {
        let state = self.read_state()?;
        if !state.orders.iter().any(|o| o.id == order_id) {
            return Err(DomainError::not_found("order"));
        }
        Ok(state
            .order_lines
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn receive(
        &self,
        order_id: OrderId,
        updates: Vec<ReceiptUpdate>,
        comments: Option<String>,
    ) -> DomainResult<ReceiveOutcome> {
        let mut state = self.write_state()?;

        let order_pos = state
            .orders
            .iter()
            .position(|o| o.id == order_id)
            .ok_or_else(|| DomainError::not_found("order"))?;

        // Work on a copy of the order's lines so a mid-call failure leaves
        // nothing applied.
        let mut lines: Vec<OrderLine> = state
            .order_lines
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect();

        let mut promoted: Vec<Isbn> = Vec::new();
        let mut promotions: Vec<OrderLine> = Vec::new();
        for update in &updates {
            let line = lines
                .iter_mut()
                .find(|l| l.id == update.line_id)
                .ok_or_else(|| DomainError::not_found("order line"))?;

            let outcome = apply_receipt(line, update.quantity_delta)?;
            line.quantity_received = outcome.new_received;
            line.is_damaged = update.is_damaged;
            if let Some(c) = &comments {
                line.comments = Some(c.clone());
            }
            if outcome.completed_now {
                promoted.push(line.isbn.clone());
                promotions.push(line.clone());
            }
        }

        let status = if order_complete(&lines) {
            OrderStatus::Received
        } else {
            OrderStatus::Pending
        };

        for line in lines {
            if let Some(slot) = state.order_lines.iter_mut().find(|l| l.id == line.id) {
                *slot = line;
            }
        }
        for line in &promotions {
            promote_locked(&mut state, line);
        }
        state.orders[order_pos].status = status;

        Ok(ReceiveOutcome { status, promoted })
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn add_items(&self, items: Vec<Item>) -> DomainResult<u64> {
        let mut state = self.write_state()?;

        let duplicates: Vec<String> = items
            .iter()
            .filter(|i| state.items.contains_key(&i.isbn))
            .map(|i| i.isbn.to_string())
            .collect();
        if !duplicates.is_empty() {
            return Err(DomainError::DuplicateIsbn(duplicates));
        }

        let count = items.len() as u64;
        for item in items {
            state.items.insert(item.isbn.clone(), item);
        }
        Ok(count)
    }

    async fn get_item(&self, isbn: &Isbn) -> DomainResult<Option<Item>> {
        let state = self.read_state()?;
        Ok(state.items.get(isbn).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn test_time(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    fn test_item(isbn: &str, copies: i64) -> Item {
        Item {
            isbn: isbn.parse().unwrap(),
            title: "Calculus".to_string(),
            author: "Spivak".to_string(),
            category: "Science".to_string(),
            edition: "4th".to_string(),
            publisher: "Publish or Perish".to_string(),
            publication_year: 2008,
            total_copies: copies,
            copies_available: copies,
        }
    }

    fn test_new_line(isbn: &str, quantity: i64) -> NewOrderLine {
        NewOrderLine {
            title: "Thermodynamics".to_string(),
            author: "Fermi".to_string(),
            isbn: isbn.parse().unwrap(),
            category: "Science".to_string(),
            edition: String::new(),
            publisher: "Dover".to_string(),
            publication_year: 1956,
            quantity,
            vendor: "Campus Books".to_string(),
        }
    }

    fn student() -> BorrowerRef {
        BorrowerRef::student("REG-1001").unwrap()
    }

    const ISBN: &str = "978-0-306-40615-7";

    async fn seeded_store(copies: i64) -> InMemoryStore {
        let store = InMemoryStore::new(CirculationPolicy::default());
        store.add_items(vec![test_item(ISBN, copies)]).await.unwrap();
        store
            .register_borrower(Borrower {
                reference: student(),
                name: "Asha Rao".to_string(),
                active: true,
            })
            .await
            .unwrap();
        store
            .register_borrower(Borrower {
                reference: BorrowerRef::staff("EMP-7").unwrap(),
                name: "M. Okafor".to_string(),
                active: false,
            })
            .await
            .unwrap();
        store
    }

    fn checkout_request(due_day: u32) -> CheckoutRequest {
        CheckoutRequest {
            isbn: ISBN.parse().unwrap(),
            borrower: student(),
            due_date: test_time(due_day, 12),
        }
    }

    #[tokio::test]
    async fn checkout_lends_a_copy() {
        let store = seeded_store(3).await;

        let record = store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();

        assert_eq!(record.status, LoanStatus::Borrowed);
        assert_eq!(record.fine_cents, 0);
        let item = store.get_item(&ISBN.parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(item.copies_available, 2);
        assert_eq!(item.total_copies, 3);
    }

    #[tokio::test]
    async fn checkout_gates_on_the_borrower_directory() {
        let store = seeded_store(3).await;

        let mut request = checkout_request(10);
        request.borrower = BorrowerRef::student("REG-9999").unwrap();
        let err = store.checkout(request, test_time(1, 9)).await.unwrap_err();
        assert_eq!(err, DomainError::BorrowerNotFound);

        let mut request = checkout_request(10);
        request.borrower = BorrowerRef::staff("EMP-7").unwrap();
        let err = store.checkout(request, test_time(1, 9)).await.unwrap_err();
        assert_eq!(err, DomainError::BorrowerInactive);

        // Nothing was lent along the way.
        let item = store.get_item(&ISBN.parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(item.copies_available, 3);
    }

    #[tokio::test]
    async fn checkout_rejects_when_no_copies_remain() {
        let store = seeded_store(1).await;

        store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();
        let err = store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::NotAvailable);
    }

    #[tokio::test]
    async fn checkout_rejects_past_due_date_before_touching_state() {
        let store = seeded_store(1).await;

        let err = store
            .checkout(checkout_request(10), test_time(20, 9))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let item = store.get_item(&ISBN.parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(item.copies_available, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_checkouts_do_not_oversell() {
        let store = Arc::new(seeded_store(1).await);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.checkout(checkout_request(10), test_time(1, 9)).await
            }));
        }

        let mut successes = 0;
        let mut unavailable = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(DomainError::NotAvailable) => unavailable += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(unavailable, 7);
        let item = store.get_item(&ISBN.parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(item.copies_available, 0);
    }

    #[tokio::test]
    async fn check_in_restores_availability_exactly_once() {
        let store = seeded_store(2).await;
        let isbn: Isbn = ISBN.parse().unwrap();

        store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();
        let record = store
            .check_in(&isbn, &student(), test_time(5, 9))
            .await
            .unwrap();
        assert_eq!(record.status, LoanStatus::Returned);
        assert_eq!(record.returned_at, Some(test_time(5, 9)));

        let item = store.get_item(&isbn).await.unwrap().unwrap();
        assert_eq!(item.copies_available, 2);

        // The second return must not free another copy.
        let err = store
            .check_in(&isbn, &student(), test_time(5, 10))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::AlreadyReturned);
        let item = store.get_item(&isbn).await.unwrap().unwrap();
        assert_eq!(item.copies_available, 2);
    }

    #[tokio::test]
    async fn check_in_without_history_reports_no_active_loan() {
        let store = seeded_store(2).await;
        let err = store
            .check_in(&ISBN.parse().unwrap(), &student(), test_time(5, 9))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::NoActiveLoan);
    }

    #[tokio::test]
    async fn overdue_check_in_accrues_the_fine() {
        let store = seeded_store(2).await;
        let isbn: Isbn = ISBN.parse().unwrap();

        store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();
        // Three days late at the default 50.00/day.
        let record = store
            .check_in(&isbn, &student(), test_time(13, 12))
            .await
            .unwrap();
        assert_eq!(record.fine_cents, 3 * 50_00);

        let fines = store.list_unpaid(test_time(13, 12)).await.unwrap();
        assert_eq!(fines.len(), 1);
        assert_eq!(fines[0].amount_cents, 3 * 50_00);
        assert_eq!(fines[0].status, FineStatus::Unpaid);
    }

    #[tokio::test]
    async fn on_time_check_in_accrues_nothing() {
        let store = seeded_store(2).await;
        let isbn: Isbn = ISBN.parse().unwrap();

        store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();
        let record = store
            .check_in(&isbn, &student(), test_time(10, 12))
            .await
            .unwrap();
        assert_eq!(record.fine_cents, 0);
        assert!(store.list_unpaid(test_time(10, 12)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn copies_are_conserved_across_mixed_operations() {
        let store = seeded_store(3).await;
        let isbn: Isbn = ISBN.parse().unwrap();

        let conserved = |item: &Item, active: usize| {
            item.copies_available + active as i64 == item.total_copies
        };

        store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();
        store
            .checkout(checkout_request(12), test_time(2, 9))
            .await
            .unwrap();
        let item = store.get_item(&isbn).await.unwrap().unwrap();
        let active = store
            .list_active_loans(None, test_time(2, 10))
            .await
            .unwrap();
        assert!(conserved(&item, active.len()));

        store
            .check_in(&isbn, &student(), test_time(3, 9))
            .await
            .unwrap();
        let item = store.get_item(&isbn).await.unwrap().unwrap();
        let active = store
            .list_active_loans(None, test_time(3, 10))
            .await
            .unwrap();
        assert!(conserved(&item, active.len()));
    }

    #[tokio::test]
    async fn active_loans_report_effective_status() {
        let store = seeded_store(3).await;

        store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();

        let before_due = store
            .list_active_loans(Some(&student()), test_time(9, 0))
            .await
            .unwrap();
        assert_eq!(before_due[0].status, LoanStatus::Borrowed);

        let after_due = store
            .list_active_loans(Some(&student()), test_time(11, 0))
            .await
            .unwrap();
        assert_eq!(after_due[0].status, LoanStatus::Overdue);

        let other = BorrowerRef::student("REG-2002").unwrap();
        let filtered = store
            .list_active_loans(Some(&other), test_time(11, 0))
            .await
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn scan_and_accrue_is_idempotent() {
        let store = seeded_store(3).await;

        store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();

        assert_eq!(store.scan_and_accrue(test_time(12, 12)).await.unwrap(), 1);
        assert_eq!(store.scan_and_accrue(test_time(13, 12)).await.unwrap(), 0);
        assert_eq!(store.list_unpaid(test_time(13, 12)).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_scans_do_not_double_fine() {
        let store = Arc::new(seeded_store(3).await);

        store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.scan_and_accrue(test_time(12, 12)).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.scan_and_accrue(test_time(12, 12)).await })
        };

        let inserted = a.await.unwrap().unwrap() + b.await.unwrap().unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.list_unpaid(test_time(12, 12)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unpaid_fines_list_oldest_due_first() {
        let store = seeded_store(3).await;
        store
            .add_items(vec![test_item("978-0-486-60361-2", 2)])
            .await
            .unwrap();

        store
            .checkout(checkout_request(8), test_time(1, 9))
            .await
            .unwrap();
        store
            .checkout(
                CheckoutRequest {
                    isbn: "978-0-486-60361-2".parse().unwrap(),
                    borrower: student(),
                    due_date: test_time(4, 12),
                },
                test_time(1, 9),
            )
            .await
            .unwrap();

        let fines = store.list_unpaid(test_time(20, 12)).await.unwrap();
        assert_eq!(fines.len(), 2);
        assert_eq!(fines[0].due_date, test_time(4, 12));
        assert_eq!(fines[1].due_date, test_time(8, 12));
    }

    #[tokio::test]
    async fn mark_paid_is_terminal() {
        let store = seeded_store(3).await;

        store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();
        let fines = store.list_unpaid(test_time(15, 12)).await.unwrap();

        let paid = store.mark_paid(fines[0].id).await.unwrap();
        assert_eq!(paid.status, FineStatus::Paid);

        let err = store.mark_paid(fines[0].id).await.unwrap_err();
        assert_eq!(err, DomainError::AlreadyPaid);

        let err = store.mark_paid(FineId::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn renewal_extends_the_due_date_and_nothing_else() {
        let store = seeded_store(3).await;

        let record = store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();
        let renewed = store.renew(record.id).await.unwrap();

        assert_eq!(renewed.due_date, test_time(24, 12));
        assert_eq!(renewed.status, LoanStatus::Borrowed);
        assert_eq!(renewed.fine_cents, 0);

        let err = store.renew(LoanId::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn renewal_of_a_returned_loan_is_rejected() {
        let store = seeded_store(3).await;
        let isbn: Isbn = ISBN.parse().unwrap();

        let record = store
            .checkout(checkout_request(10), test_time(1, 9))
            .await
            .unwrap();
        store
            .check_in(&isbn, &student(), test_time(5, 9))
            .await
            .unwrap();

        let err = store.renew(record.id).await.unwrap_err();
        assert_eq!(err, DomainError::AlreadyReturned);
    }

    #[tokio::test]
    async fn create_order_requires_lines() {
        let store = seeded_store(0).await;
        let err = store
            .create_order(vec![], test_time(1, 9))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::EmptyOrder);
    }

    #[tokio::test]
    async fn receive_applies_increments_and_promotes_once() {
        let store = InMemoryStore::new(CirculationPolicy::default());
        let new_isbn = "978-0-14-044913-6";

        let (order, lines) = store
            .create_order(vec![test_new_line(new_isbn, 10)], test_time(1, 9))
            .await
            .unwrap();
        let line_id = lines[0].id;

        let outcome = store
            .receive(
                order.id,
                vec![ReceiptUpdate {
                    line_id,
                    quantity_delta: 4,
                    is_damaged: false,
                }],
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Pending);
        assert!(outcome.promoted.is_empty());
        assert!(store.get_item(&new_isbn.parse().unwrap()).await.unwrap().is_none());

        let outcome = store
            .receive(
                order.id,
                vec![ReceiptUpdate {
                    line_id,
                    quantity_delta: 6,
                    is_damaged: false,
                }],
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Received);
        assert_eq!(outcome.promoted.len(), 1);

        let item = store
            .get_item(&new_isbn.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.total_copies, 10);
        assert_eq!(item.copies_available, 10);

        // Anything further is over-receipt; the catalog is not touched again.
        let err = store
            .receive(
                order.id,
                vec![ReceiptUpdate {
                    line_id,
                    quantity_delta: 1,
                    is_damaged: false,
                }],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::OverReceipt(_)));
        let item = store
            .get_item(&new_isbn.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.total_copies, 10);
    }

    #[tokio::test]
    async fn receive_rolls_back_fully_on_a_failed_update() {
        let store = InMemoryStore::new(CirculationPolicy::default());

        let (order, lines) = store
            .create_order(
                vec![
                    test_new_line("978-0-14-044913-6", 4),
                    test_new_line("978-0-486-60361-2", 5),
                ],
                test_time(1, 9),
            )
            .await
            .unwrap();

        let err = store
            .receive(
                order.id,
                vec![
                    ReceiptUpdate {
                        line_id: lines[0].id,
                        quantity_delta: 4,
                        is_damaged: false,
                    },
                    ReceiptUpdate {
                        line_id: lines[1].id,
                        quantity_delta: 9,
                        is_damaged: false,
                    },
                ],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::OverReceipt(_)));

        // The first update must not stick, and nothing was promoted.
        let stored = store.order_lines(order.id).await.unwrap();
        assert_eq!(stored[0].quantity_received, 0);
        assert_eq!(stored[1].quantity_received, 0);
        assert!(store
            .get_item(&"978-0-14-044913-6".parse().unwrap())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn order_completes_only_when_every_line_is_full() {
        let store = InMemoryStore::new(CirculationPolicy::default());

        let (order, lines) = store
            .create_order(
                vec![
                    test_new_line("978-0-14-044913-6", 10),
                    test_new_line("978-0-486-60361-2", 5),
                ],
                test_time(1, 9),
            )
            .await
            .unwrap();

        let outcome = store
            .receive(
                order.id,
                vec![
                    ReceiptUpdate {
                        line_id: lines[0].id,
                        quantity_delta: 10,
                        is_damaged: false,
                    },
                    ReceiptUpdate {
                        line_id: lines[1].id,
                        quantity_delta: 4,
                        is_damaged: false,
                    },
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Pending);
        assert_eq!(outcome.promoted.len(), 1);

        let outcome = store
            .receive(
                order.id,
                vec![ReceiptUpdate {
                    line_id: lines[1].id,
                    quantity_delta: 1,
                    is_damaged: false,
                }],
                None,
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, OrderStatus::Received);

        let summaries = store.list_orders().await.unwrap();
        assert_eq!(summaries[0].status, OrderStatus::Received);
        assert_eq!(summaries[0].line_count, 2);
    }

    #[tokio::test]
    async fn promotion_tops_up_an_already_cataloged_item() {
        let store = seeded_store(3).await;

        let (order, lines) = store
            .create_order(vec![test_new_line(ISBN, 10)], test_time(1, 9))
            .await
            .unwrap();
        store
            .receive(
                order.id,
                vec![ReceiptUpdate {
                    line_id: lines[0].id,
                    quantity_delta: 10,
                    is_damaged: false,
                }],
                None,
            )
            .await
            .unwrap();

        let item = store.get_item(&ISBN.parse().unwrap()).await.unwrap().unwrap();
        assert_eq!(item.total_copies, 13);
        assert_eq!(item.copies_available, 13);
    }

    #[tokio::test]
    async fn receive_records_damage_and_comments() {
        let store = InMemoryStore::new(CirculationPolicy::default());

        let (order, lines) = store
            .create_order(vec![test_new_line("978-0-14-044913-6", 4)], test_time(1, 9))
            .await
            .unwrap();
        store
            .receive(
                order.id,
                vec![ReceiptUpdate {
                    line_id: lines[0].id,
                    quantity_delta: 2,
                    is_damaged: true,
                }],
                Some("two water-damaged".to_string()),
            )
            .await
            .unwrap();

        let stored = store.order_lines(order.id).await.unwrap();
        assert!(stored[0].is_damaged);
        assert_eq!(stored[0].comments.as_deref(), Some("two water-damaged"));
    }

    #[tokio::test]
    async fn lines_of_an_unknown_order_report_not_found() {
        let store = InMemoryStore::new(CirculationPolicy::default());
        let err = store.order_lines(OrderId::new()).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn bulk_ingest_is_all_or_nothing() {
        let store = seeded_store(3).await;

        let err = store
            .add_items(vec![
                test_item("978-0-14-044913-6", 2),
                test_item(ISBN, 1),
            ])
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::DuplicateIsbn(vec![ISBN.to_string()]));

        // The non-colliding row must not have been persisted either.
        assert!(store
            .get_item(&"978-0-14-044913-6".parse().unwrap())
            .await
            .unwrap()
            .is_none());
    }
}

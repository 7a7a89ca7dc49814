//! Circulation domain module (loans and fines).
//!
//! This crate contains the borrowing state machine and fine arithmetic,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage).

pub mod fine;
pub mod loan;

pub use fine::{Fine, FineStatus};
pub use loan::{
    days_overdue, effective_status, fine_for_overdue, renewed_due_date, validate_checkout_due_date,
    BorrowRecord, LoanStatus,
};

use chrono::{DateTime, Duration, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use stacks_core::{BorrowerRef, CirculationPolicy, DomainError, Isbn, LoanId};

/// Loan lifecycle status.
///
/// `Borrowed -> Overdue -> Returned`, with `Overdue` reachable only by
/// re-evaluating an active loan against the clock. `Returned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Borrowed,
    Overdue,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Borrowed => "borrowed",
            LoanStatus::Overdue => "overdue",
            LoanStatus::Returned => "returned",
        }
    }

    /// Active loans hold a copy (availability accounting includes them).
    pub fn is_active(&self) -> bool {
        !matches!(self, LoanStatus::Returned)
    }
}

impl FromStr for LoanStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borrowed" => Ok(LoanStatus::Borrowed),
            "overdue" => Ok(LoanStatus::Overdue),
            "returned" => Ok(LoanStatus::Returned),
            other => Err(DomainError::validation(format!(
                "invalid loan status: {other}"
            ))),
        }
    }
}

/// One loan of one physical copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowRecord {
    pub id: LoanId,
    pub isbn: Isbn,
    pub borrower: BorrowerRef,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: LoanStatus,
    /// Fine accumulated at this record, in cents.
    pub fine_cents: i64,
    pub returned_at: Option<DateTime<Utc>>,
}

impl BorrowRecord {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Status as an observer sees it at `now`.
///
/// The stored status is rewritten only at check-in, so a loan past its due
/// date usually still reads `Borrowed` in the store. Every read path reports
/// through this function instead of trusting the column.
pub fn effective_status(record: &BorrowRecord, now: DateTime<Utc>) -> LoanStatus {
    match record.status {
        LoanStatus::Returned => LoanStatus::Returned,
        LoanStatus::Overdue => LoanStatus::Overdue,
        LoanStatus::Borrowed => {
            if record.due_date < now {
                LoanStatus::Overdue
            } else {
                LoanStatus::Borrowed
            }
        }
    }
}

/// Whole days late, rounding any partial day up. Zero when not yet due.
pub fn days_overdue(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let late_ms = now.signed_duration_since(due_date).num_milliseconds();
    if late_ms <= 0 {
        0
    } else {
        (late_ms as u64).div_ceil(86_400_000) as i64
    }
}

/// Fine owed for a loan overdue at `now`, in cents.
pub fn fine_for_overdue(
    policy: &CirculationPolicy,
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> i64 {
    days_overdue(due_date, now) * policy.fine_per_day_cents
}

/// Checkout accepts due dates from `now` onward.
pub fn validate_checkout_due_date(
    due_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), DomainError> {
    if due_date < now {
        return Err(DomainError::validation("due date must not be in the past"));
    }
    Ok(())
}

/// Due date after one renewal. Applies from the current due date even when
/// the loan is already overdue; accrued fines are untouched.
pub fn renewed_due_date(due_date: DateTime<Utc>, policy: &CirculationPolicy) -> DateTime<Utc> {
    due_date + Duration::days(policy.renewal_extension_days)
}

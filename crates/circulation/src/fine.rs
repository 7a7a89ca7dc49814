use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use stacks_core::{BorrowerRef, DomainError, FineId, Isbn};

/// Fine lifecycle status. `Paid` is terminal; there is no partial payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FineStatus {
    Unpaid,
    Paid,
}

impl FineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineStatus::Unpaid => "unpaid",
            FineStatus::Paid => "paid",
        }
    }
}

impl FromStr for FineStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(FineStatus::Unpaid),
            "paid" => Ok(FineStatus::Paid),
            other => Err(DomainError::validation(format!(
                "invalid fine status: {other}"
            ))),
        }
    }
}

/// Fine ledger entry.
///
/// At most one `Unpaid` fine exists per (borrower, item) pair; the store
/// enforces this with a uniqueness constraint, not just a prior lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
    pub id: FineId,
    pub borrower: BorrowerRef,
    pub isbn: Isbn,
    /// Due date of the loan the fine derives from.
    pub due_date: DateTime<Utc>,
    pub amount_cents: i64,
    pub status: FineStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        assert_eq!("unpaid".parse::<FineStatus>().unwrap(), FineStatus::Unpaid);
        assert_eq!("paid".parse::<FineStatus>().unwrap(), FineStatus::Paid);
        assert!("waived".parse::<FineStatus>().is_err());
    }
}

//! Borrower references.
//!
//! Students and staff are disjoint borrower classes resolved through an
//! external directory. A loan carries exactly one of the two.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Borrower class.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowerKind {
    /// Identified by registration number.
    Student,
    /// Identified by employee number; must be active to borrow.
    Staff,
}

impl BorrowerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowerKind::Student => "student",
            BorrowerKind::Staff => "staff",
        }
    }
}

impl core::fmt::Display for BorrowerKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BorrowerKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(BorrowerKind::Student),
            "staff" => Ok(BorrowerKind::Staff),
            other => Err(DomainError::validation(format!(
                "invalid borrower kind: {other}"
            ))),
        }
    }
}

/// Reference to a borrower: class plus the directory identifier within it
/// (registration number for students, employee number for staff).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BorrowerRef {
    pub kind: BorrowerKind,
    pub id: String,
}

impl BorrowerRef {
    pub fn new(kind: BorrowerKind, id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::validation("borrower id must not be empty"));
        }
        Ok(Self { kind, id })
    }

    pub fn student(id: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(BorrowerKind::Student, id)
    }

    pub fn staff(id: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(BorrowerKind::Staff, id)
    }
}

impl core::fmt::Display for BorrowerRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

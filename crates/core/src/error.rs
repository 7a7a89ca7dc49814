//! Domain error model.

use thiserror::Error;

/// Result type used across the domain and store layers.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures (validation, state conflicts, lookups) plus
/// the storage failure surface that handlers must map to responses. Variants
/// that callers discriminate on carry their own arm rather than a shared
/// "conflict" bucket.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested entity was not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The borrower reference did not resolve in the directory.
    #[error("borrower not found")]
    BorrowerNotFound,

    /// The borrower exists but is deactivated.
    #[error("borrower is inactive")]
    BorrowerInactive,

    /// No lendable copy of the item remains.
    #[error("no copies available")]
    NotAvailable,

    /// No active loan matches the (item, borrower) pair.
    #[error("no active loan for this item and borrower")]
    NoActiveLoan,

    /// The loan reached its terminal state earlier; the operation cannot
    /// apply a second time.
    #[error("loan already returned")]
    AlreadyReturned,

    /// The fine reached its terminal state earlier.
    #[error("fine already paid")]
    AlreadyPaid,

    /// A receipt would push a line past its ordered quantity.
    #[error("over-receipt: {0}")]
    OverReceipt(String),

    /// An order was submitted with no usable lines.
    #[error("order has no lines")]
    EmptyOrder,

    /// Catalog ingestion collided with existing or repeated ISBNs.
    #[error("duplicate ISBNs: {0:?}")]
    DuplicateIsbn(Vec<String>),

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,

    /// Storage failure. The enclosing transaction has been rolled back.
    #[error("store error: {0}")]
    Store(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    pub fn over_receipt(msg: impl Into<String>) -> Self {
        Self::OverReceipt(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

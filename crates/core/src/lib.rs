//! `stacks-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod borrower;
pub mod error;
pub mod id;
pub mod isbn;
pub mod policy;

pub use borrower::{BorrowerKind, BorrowerRef};
pub use error::{DomainError, DomainResult};
pub use id::{FineId, LineId, LoanId, OrderId};
pub use isbn::Isbn;
pub use policy::CirculationPolicy;

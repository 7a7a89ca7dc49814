//! Store boundary.
//!
//! This module defines the infrastructure-facing traits the circulation,
//! fine, acquisition, and catalog operations run against, without making any
//! storage assumptions. Two implementations ship: an in-memory store for
//! dev/test and a Postgres store for production.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{
    AcquisitionStore, Borrower, BorrowerDirectory, CatalogStore, CheckoutRequest,
    CirculationStore, FineStore, OrderSummary, ReceiveOutcome,
};

//! Catalog domain module (items and bulk ingestion).
//!
//! This crate contains the item model and the validation rules for bulk
//! catalog ingestion, implemented purely as deterministic domain logic (no
//! IO, no HTTP, no storage).

pub mod bulk;
pub mod item;

pub use bulk::{prepare_batch, BulkRow};
pub use item::{Category, Item};

//! Acquisitions domain module (purchase orders and receiving).
//!
//! This crate contains business rules for order creation, receipt
//! reconciliation, and catalog promotion detection, implemented purely as
//! deterministic domain logic (no IO beyond parsing uploaded bytes, no HTTP,
//! no storage).

pub mod ingest;
pub mod order;
pub mod receipt;

pub use ingest::parse_order_rows;
pub use order::{NewOrderLine, Order, OrderLine, OrderStatus};
pub use receipt::{apply_receipt, order_complete, ReceiptOutcome, ReceiptUpdate};

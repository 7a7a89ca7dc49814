//! Infrastructure layer: persistence behind the store traits.

pub mod store;

pub use store::{
    AcquisitionStore, Borrower, BorrowerDirectory, CatalogStore, CheckoutRequest,
    CirculationStore, FineStore, InMemoryStore, OrderSummary, PostgresStore, ReceiveOutcome,
};

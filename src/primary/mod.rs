//! The primary (system-of-record) store boundary.

mod error;
mod in_memory;
mod store;

pub use error::{BookConflict, ConcurrencyConflict, PrimaryStoreError};
pub use in_memory::{InMemoryPrimaryStore, InMemoryTransaction};
pub use store::{BookReader, PrimaryStore};

//! Read Models - the secondary store holding denormalized projections.
//!
//! The secondary store has no transactions. Writes are staged on a store
//! handle and land one document at a time when [`ReadModelStore::save_pending`]
//! runs, which reports how many documents were actually written.
//!
//! ## Example
//!
//! ```ignore
//! use synced_rust::{InMemoryReadModelStore, ReadModel, ReadModelStore, ReadModelsExt};
//!
//! #[derive(Serialize, Deserialize, Clone, ReadModel)]
//! #[readmodel(collection = "shelf_views")]
//! struct ShelfView {
//!     #[readmodel(id)]
//!     pub shelf: String,
//!     pub books: u32,
//! }
//!
//! let store = InMemoryReadModelStore::new();
//! store.stage_insert(&view)?;
//! assert_eq!(store.save_pending()?, 1);
//! let loaded = store.read_models::<ShelfView>().get("fiction")?;
//! ```

mod in_memory;
mod repository;
mod store;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Trait for types that can be stored as read models.
pub trait ReadModel: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The collection name for this read model type (e.g., "book_listings").
    const COLLECTION: &'static str;

    /// Returns the unique identifier for this read model instance.
    fn id(&self) -> String;
}

/// A versioned wrapper around stored data.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

/// Error type for read model store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadModelError {
    /// The store could not be reached. Distinct from `NotFound`.
    #[error("read model store unavailable: {0}")]
    Unavailable(String),
    /// Insert of a document that already exists.
    #[error("read model already exists: {collection}:{id}")]
    Conflict { collection: String, id: String },
    /// Replace or delete of a document that does not exist.
    #[error("read model not found: {collection}:{id}")]
    NotFound { collection: String, id: String },
    #[error("read model serialization error: {0}")]
    Serde(String),
    #[error("read model storage error: {0}")]
    Storage(String),
}

impl ReadModelError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ReadModelError::Unavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadModelError::NotFound { .. })
    }
}

pub use in_memory::InMemoryReadModelStore;
pub use repository::{ReadModelRepository, ReadModelsExt};
pub use store::ReadModelStore;

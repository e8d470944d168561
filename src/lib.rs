//! Dual-write synchronization for a book catalogue.
//!
//! Books, their author links and reviews live in a transactional primary
//! store. A flattened [`BookListing`] per book lives in a secondary store
//! that only offers per-document writes. The [`Synchronizer`] keeps the two
//! in step: it classifies what a [`UnitOfWork`] changed, saves the primary
//! rows inside a transaction, writes the listings, checks the counts agree
//! and only then commits the primary transaction.

// Lets `#[derive(ReadModel)]` expand to `synced_rust::ReadModel` inside this crate.
extern crate self as synced_rust;

pub mod book;
pub mod bulk;
mod error;
pub mod primary;
pub mod read_model;
pub mod sync;
pub mod unit_of_work;

pub use book::{Author, AuthorId, Book, BookId, CachedFields, NewBook, Review, ReviewId, ValidationError};
pub use bulk::{BulkLoader, BulkProgress};
pub use error::SyncError;
pub use primary::{
    BookConflict, BookReader, ConcurrencyConflict, InMemoryPrimaryStore, PrimaryStore,
    PrimaryStoreError,
};
pub use read_model::{
    InMemoryReadModelStore, ReadModel, ReadModelError, ReadModelRepository, ReadModelStore,
    ReadModelsExt, Versioned,
};
pub use sync::{
    ApplyReport, BookChange, BookListing, CancellationToken, ChangeClassifier,
    ConcurrencyResolver, ListingBuilder, ProjectionApplier, Projector, Reconciliation,
    RetryConfig, SyncConfig, SyncOutcome, Synchronizer,
};
pub use synced_rust_macros::ReadModel;
pub use unit_of_work::{ChangeKind, FieldChange, Mutation, MutationTarget, UnitOfWork};

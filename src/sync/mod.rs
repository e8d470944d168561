//! Dual-write synchronization.
//!
//! - [`ChangeClassifier`] - one change record per book from the mutation log
//! - [`Projector`] / [`ListingBuilder`] - book to [`BookListing`]
//! - [`ProjectionApplier`] - change records to staged listing writes
//! - [`Synchronizer`] - primary save, projection write and primary commit as one unit
//! - [`ConcurrencyResolver`] - delta-based repair of conflicting cached fields
//!
//! ## Example
//!
//! ```ignore
//! use synced_rust::{InMemoryPrimaryStore, InMemoryReadModelStore, Synchronizer, UnitOfWork};
//!
//! let sync = Synchronizer::new(primary).with_projection(listings);
//! let mut uow = UnitOfWork::new();
//! uow.add_review(sync.primary(), book_id, review)?;
//! let outcome = sync.synchronize(&mut uow)?;
//! ```

mod applier;
mod classifier;
mod config;
mod orchestrator;
mod projector;
mod resolver;

pub use applier::{ApplyReport, ProjectionApplier};
pub use classifier::{BookChange, ChangeClassifier};
pub use config::{RetryConfig, SyncConfig};
pub use orchestrator::{CancellationToken, SyncOutcome, Synchronizer};
pub use projector::{BookListing, ListingBuilder, Projector};
pub use resolver::{merge_review_stats, ConcurrencyResolver, Reconciliation};

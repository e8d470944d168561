use std::fmt;

use thiserror::Error;

use crate::book::{BookId, ValidationError};
use crate::primary::{ConcurrencyConflict, PrimaryStoreError};
use crate::read_model::ReadModelError;

/// Everything a synchronize call can fail with.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Primary(PrimaryStoreError),
    #[error("projection store failed: {0}")]
    Projection(#[from] ReadModelError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("projection wrote {actual} aggregates but {expected} changes were classified")]
    Inconsistency { expected: usize, actual: usize },
    #[error(transparent)]
    Concurrency(ConcurrencyConflict),
    #[error("malformed mutation log: {0}")]
    Contract(String),
    #[error("synchronization cancelled")]
    Cancelled,
    /// The primary commit failed after listings were written, and the
    /// listings for `books` could not be restored from committed state.
    #[error("listings for {} books are ahead of the primary store after: {cause}", .books.len())]
    ProjectionAhead {
        books: Vec<BookId>,
        cause: Box<SyncError>,
    },
}

impl SyncError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        SyncError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<PrimaryStoreError> for SyncError {
    fn from(err: PrimaryStoreError) -> Self {
        match err {
            PrimaryStoreError::Concurrency(conflict) => SyncError::Concurrency(conflict),
            PrimaryStoreError::Validation(err) => SyncError::Validation(err),
            other => SyncError::Primary(other),
        }
    }
}

impl From<ConcurrencyConflict> for SyncError {
    fn from(conflict: ConcurrencyConflict) -> Self {
        SyncError::Concurrency(conflict)
    }
}

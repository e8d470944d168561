use std::time::Duration;

use thiserror::Error;

use crate::book::{AuthorId, BookId, CachedFields, ValidationError};

/// Failures reported by a primary store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrimaryStoreError {
    #[error("deadlock detected, transaction chosen as victim")]
    Deadlock,
    #[error("primary store timed out after {0:?}")]
    Timeout(Duration),
    #[error("serialization failure: {0}")]
    SerializationFailure(String),
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyConflict),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("transaction {0} is no longer active")]
    TransactionClosed(u64),
    #[error("primary store lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("primary store error: {0}")]
    Storage(String),
}

impl PrimaryStoreError {
    /// Deadlocks, timeouts and serialization failures succeed when the whole
    /// unit is run again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PrimaryStoreError::Deadlock
                | PrimaryStoreError::Timeout(_)
                | PrimaryStoreError::SerializationFailure(_)
        )
    }
}

/// An optimistic-concurrency token did not match at save time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConcurrencyConflict {
    #[error("cached fields of book {} were changed by another writer", .0.book_id)]
    Book(BookConflict),
    #[error("author {author_id} was changed by another writer (expected version {expected}, found {actual:?})")]
    Author {
        author_id: AuthorId,
        expected: u64,
        actual: Option<u64>,
    },
}

/// Conflict report for a book row.
///
/// `original` is what the losing write assumed was stored, `intended` is what
/// it tried to store, `current` is what the store holds now (`None` when the
/// row is gone).
#[derive(Debug, Clone, PartialEq)]
pub struct BookConflict {
    pub book_id: BookId,
    pub original: CachedFields,
    pub intended: CachedFields,
    pub current: Option<CachedFields>,
}

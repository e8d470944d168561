//! The book aggregate and its children.
//!
//! Business rules here are plain invariant checks. Everything that keeps the
//! projection in step with these types lives in [`crate::sync`].

mod author;
#[allow(clippy::module_inception)]
mod book;
mod ids;
mod review;

use thiserror::Error;

pub use author::{format_authors_ordered, Author, BookAuthor};
pub use book::{Book, CachedFields, NewBook};
pub use ids::{AuthorId, BookId, ReviewId};
pub use review::{Review, MAX_STARS};

/// Separator used when joining author names into `authors_ordered`.
pub const AUTHORS_SEPARATOR: &str = ", ";

/// A required field is empty or out of range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

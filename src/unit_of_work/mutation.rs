use serde::{Deserialize, Serialize};

use crate::book::{AuthorId, BookId, ReviewId};

/// What happened to an entity, or to an aggregate after classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// Before/after values of a single field within one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange<T> {
    pub original: T,
    pub current: T,
}

impl<T: PartialEq> FieldChange<T> {
    pub fn new(original: T, current: T) -> Self {
        Self { original, current }
    }

    pub fn changed(&self) -> bool {
        self.original != self.current
    }
}

impl FieldChange<bool> {
    pub fn unchanged(value: bool) -> Self {
        Self::new(value, value)
    }
}

/// The entity a mutation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationTarget {
    Book {
        id: BookId,
        soft_deleted: FieldChange<bool>,
    },
    Review {
        review_id: ReviewId,
        book_id: Option<BookId>,
    },
    BookAuthor {
        author_id: AuthorId,
        book_id: Option<BookId>,
    },
    Author(AuthorId),
}

/// One entry of the unit of work's mutation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub target: MutationTarget,
    pub kind: ChangeKind,
}

impl Mutation {
    pub fn book(id: BookId, kind: ChangeKind, soft_deleted: FieldChange<bool>) -> Self {
        Self {
            target: MutationTarget::Book { id, soft_deleted },
            kind,
        }
    }

    pub fn review(book_id: BookId, review_id: ReviewId, kind: ChangeKind) -> Self {
        Self {
            target: MutationTarget::Review {
                review_id,
                book_id: Some(book_id),
            },
            kind,
        }
    }

    pub fn book_author(book_id: BookId, author_id: AuthorId, kind: ChangeKind) -> Self {
        Self {
            target: MutationTarget::BookAuthor {
                author_id,
                book_id: Some(book_id),
            },
            kind,
        }
    }

    pub fn author(id: AuthorId, kind: ChangeKind) -> Self {
        Self {
            target: MutationTarget::Author(id),
            kind,
        }
    }
}

//! ChangeClassifier - reduces a mutation log to one change record per book.

use std::collections::BTreeMap;

use tracing::debug;

use crate::book::BookId;
use crate::error::SyncError;
use crate::unit_of_work::{ChangeKind, FieldChange, Mutation, MutationTarget};

/// Net effect of a unit of work on one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookChange {
    pub book_id: BookId,
    pub kind: ChangeKind,
}

/// Book-level records for one book folded into a single record.
#[derive(Debug, Clone, Copy)]
struct Folded {
    kind: ChangeKind,
    soft_deleted: FieldChange<bool>,
    added_then_removed: bool,
}

impl Folded {
    fn new(kind: ChangeKind, soft_deleted: FieldChange<bool>) -> Self {
        Self {
            kind,
            soft_deleted,
            added_then_removed: false,
        }
    }

    fn merge(&mut self, kind: ChangeKind, soft_deleted: FieldChange<bool>) {
        self.soft_deleted.current = soft_deleted.current;
        self.kind = match (self.kind, kind) {
            (ChangeKind::Added, ChangeKind::Deleted) => {
                self.added_then_removed = true;
                ChangeKind::Unchanged
            }
            (_, ChangeKind::Deleted) => ChangeKind::Deleted,
            (ChangeKind::Added, _) => ChangeKind::Added,
            (ChangeKind::Deleted, _) => ChangeKind::Deleted,
            (_, ChangeKind::Modified) | (ChangeKind::Modified, _) => ChangeKind::Modified,
            (previous, ChangeKind::Unchanged) => previous,
            (ChangeKind::Unchanged, next) => next,
        };
    }

    fn classify(&self) -> ChangeKind {
        if self.added_then_removed {
            return ChangeKind::Unchanged;
        }
        match (self.soft_deleted.original, self.soft_deleted.current) {
            (false, true) => ChangeKind::Deleted,
            (true, false) => ChangeKind::Added,
            (_, flag) if self.kind == ChangeKind::Deleted => {
                if flag {
                    ChangeKind::Unchanged
                } else {
                    ChangeKind::Deleted
                }
            }
            _ => self.kind,
        }
    }
}

/// Classifies the pending mutations of a unit of work.
///
/// Must run before the primary save: the original values it compares are
/// gone once the rows are written.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeClassifier;

impl ChangeClassifier {
    /// One record per touched book, in book id order. Unchanged books are
    /// dropped. A child mutation without a parent book is a
    /// [`SyncError::Contract`] violation.
    pub fn classify(mutations: &[Mutation]) -> Result<BTreeMap<BookId, BookChange>, SyncError> {
        let mut books: BTreeMap<BookId, Folded> = BTreeMap::new();
        let mut children: BTreeMap<BookId, usize> = BTreeMap::new();

        for mutation in mutations {
            match mutation.target {
                MutationTarget::Book { id, soft_deleted } => match books.get_mut(&id) {
                    Some(folded) => folded.merge(mutation.kind, soft_deleted),
                    None => {
                        books.insert(id, Folded::new(mutation.kind, soft_deleted));
                    }
                },
                MutationTarget::Review { review_id, book_id } => {
                    let book_id = book_id.ok_or_else(|| {
                        SyncError::Contract(format!("review {} has no parent book", review_id))
                    })?;
                    *children.entry(book_id).or_default() += 1;
                }
                MutationTarget::BookAuthor { author_id, book_id } => {
                    let book_id = book_id.ok_or_else(|| {
                        SyncError::Contract(format!(
                            "author link {} has no parent book",
                            author_id
                        ))
                    })?;
                    *children.entry(book_id).or_default() += 1;
                }
                // Author edits are staged as explicit book mutations.
                MutationTarget::Author(_) => {}
            }
        }

        let mut changes = BTreeMap::new();
        for (book_id, folded) in &books {
            let kind = folded.classify();
            if kind != ChangeKind::Unchanged {
                changes.insert(*book_id, BookChange { book_id: *book_id, kind });
            }
        }
        for book_id in children.keys() {
            if !books.contains_key(book_id) {
                changes.insert(
                    *book_id,
                    BookChange {
                        book_id: *book_id,
                        kind: ChangeKind::Modified,
                    },
                );
            }
        }

        debug!(
            target: "synced::sync",
            mutations = mutations.len(),
            changes = changes.len(),
            "mutations classified"
        );
        Ok(changes)
    }
}

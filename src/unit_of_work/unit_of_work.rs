use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::book::{Author, AuthorId, Book, BookId, CachedFields, Review, ReviewId, ValidationError};
use crate::error::SyncError;
use crate::primary::BookReader;

use super::{ChangeKind, FieldChange, Mutation};

/// How a staged row is written to the primary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Insert,
    Update,
    Delete,
}

/// A book row waiting to be written.
///
/// `original` holds the cached fields as they were loaded; the store compares
/// it against what it holds to detect concurrent writers. It is `None` for
/// inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedBook {
    pub op: WriteOp,
    pub book: Book,
    pub original: Option<CachedFields>,
}

/// An author row waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedAuthor {
    pub op: WriteOp,
    pub author: Author,
    pub expected_version: Option<u64>,
}

/// Collects the rows to write and the log of what changed.
///
/// Every mutating method stages the affected rows and appends to the mutation
/// log, which is what the change classifier reads. Reads go through a
/// [`BookReader`], so rows already staged in this unit of work shadow the
/// durable ones.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    books: BTreeMap<BookId, StagedBook>,
    authors: BTreeMap<AuthorId, StagedAuthor>,
    log: Vec<Mutation>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.log
    }

    /// Appends a raw entry to the mutation log.
    ///
    /// For integrating writers that stage rows through other means; the
    /// entry is classified like any other.
    pub fn record(&mut self, mutation: Mutation) {
        self.log.push(mutation);
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty() && self.authors.is_empty() && self.log.is_empty()
    }

    pub fn staged_books(&self) -> impl Iterator<Item = &StagedBook> {
        self.books.values()
    }

    pub fn staged_authors(&self) -> impl Iterator<Item = &StagedAuthor> {
        self.authors.values()
    }

    pub fn staged_book(&self, id: &BookId) -> Option<&StagedBook> {
        self.books.get(id)
    }

    pub(crate) fn staged_book_mut(&mut self, id: &BookId) -> Option<&mut StagedBook> {
        self.books.get_mut(id)
    }

    /// Drops a staged book write without touching the log.
    pub(crate) fn detach_book(&mut self, id: &BookId) -> Option<StagedBook> {
        self.books.remove(id)
    }

    /// Forgets everything staged. Called after a successful synchronize.
    pub fn clear(&mut self) {
        self.books.clear();
        self.authors.clear();
        self.log.clear();
    }

    pub fn add_author(&mut self, author: Author) -> AuthorId {
        let id = author.id;
        self.authors.insert(
            id,
            StagedAuthor {
                op: WriteOp::Insert,
                author,
                expected_version: None,
            },
        );
        self.log.push(Mutation::author(id, ChangeKind::Added));
        id
    }

    pub fn rename_author<R: BookReader>(
        &mut self,
        reader: &R,
        author_id: AuthorId,
        name: impl Into<String>,
    ) -> Result<(), SyncError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::new("author.name", "must not be empty").into());
        }

        let staged = self.load_author(reader, author_id)?;
        staged.author.name = name;
        self.log.push(Mutation::author(author_id, ChangeKind::Modified));

        let mut affected: Vec<BookId> = reader.books_by_author(&author_id)?;
        affected.extend(
            self.books
                .values()
                .filter(|staged| staged.op != WriteOp::Delete)
                .filter(|staged| staged.book.references_author(&author_id))
                .map(|staged| staged.book.id()),
        );
        affected.sort();
        affected.dedup();

        for book_id in affected {
            let names = self.author_names(reader, &book_id)?;
            let Some(staged) = self.books_for_update(reader, book_id)? else {
                continue;
            };
            if staged.op == WriteOp::Delete {
                continue;
            }
            let soft = staged.book.is_soft_deleted();
            staged
                .book
                .refresh_authors_ordered(|id| names.get(id).map(String::as_str));
            self.log.push(Mutation::book(
                book_id,
                ChangeKind::Modified,
                FieldChange::unchanged(soft),
            ));
        }
        debug!(target: "synced::sync", author = %author_id, "author renamed");
        Ok(())
    }

    pub fn add_book(&mut self, book: Book) -> Result<BookId, SyncError> {
        book.validate()?;
        let id = book.id();
        if self.books.contains_key(&id) {
            return Err(SyncError::Contract(format!("book {} is already staged", id)));
        }
        for link in book.authors() {
            self.log
                .push(Mutation::book_author(id, link.author_id, ChangeKind::Added));
        }
        let soft = FieldChange::unchanged(book.is_soft_deleted());
        self.books.insert(
            id,
            StagedBook {
                op: WriteOp::Insert,
                book,
                original: None,
            },
        );
        self.log.push(Mutation::book(id, ChangeKind::Added, soft));
        Ok(id)
    }

    /// Applies `change` to an active book. The staged book is left untouched
    /// when `change` or validation fails.
    ///
    /// Reviews added or removed inside `change` are logged like the ones
    /// staged through [`add_review`](Self::add_review) and
    /// [`remove_review`](Self::remove_review).
    pub fn update_book<R, F>(&mut self, reader: &R, id: BookId, change: F) -> Result<(), SyncError>
    where
        R: BookReader,
        F: FnOnce(&mut Book) -> Result<(), ValidationError>,
    {
        let staged = self.active_book(reader, id)?;
        let mut book = staged.book.clone();
        change(&mut book)?;
        book.validate()?;

        let before: BTreeSet<ReviewId> = staged.book.reviews().iter().map(|r| r.id).collect();
        let after: BTreeSet<ReviewId> = book.reviews().iter().map(|r| r.id).collect();
        let soft = FieldChange::unchanged(book.is_soft_deleted());
        staged.book = book;

        self.log.push(Mutation::book(id, ChangeKind::Modified, soft));
        for review_id in after.difference(&before) {
            self.log
                .push(Mutation::review(id, *review_id, ChangeKind::Added));
        }
        for review_id in before.difference(&after) {
            self.log
                .push(Mutation::review(id, *review_id, ChangeKind::Deleted));
        }
        Ok(())
    }

    pub fn add_review<R: BookReader>(
        &mut self,
        reader: &R,
        book_id: BookId,
        review: Review,
    ) -> Result<ReviewId, SyncError> {
        let review_id = review.id;
        let staged = self.active_book(reader, book_id)?;
        staged.book.add_review(review)?;
        self.log
            .push(Mutation::review(book_id, review_id, ChangeKind::Added));
        Ok(review_id)
    }

    /// Returns false when the book has no such review.
    pub fn remove_review<R: BookReader>(
        &mut self,
        reader: &R,
        book_id: BookId,
        review_id: ReviewId,
    ) -> Result<bool, SyncError> {
        let staged = self.active_book(reader, book_id)?;
        if staged.book.remove_review(&review_id).is_none() {
            return Ok(false);
        }
        self.log
            .push(Mutation::review(book_id, review_id, ChangeKind::Deleted));
        Ok(true)
    }

    /// Replaces a book's authors; `author_ids[i]` gets ordinal `i`.
    pub fn set_authors<R: BookReader>(
        &mut self,
        reader: &R,
        book_id: BookId,
        author_ids: &[AuthorId],
    ) -> Result<(), SyncError> {
        let mut authors = Vec::with_capacity(author_ids.len());
        for id in author_ids {
            authors.push(self.find_author(reader, *id)?);
        }

        let staged = self.active_book(reader, book_id)?;
        let previous: Vec<AuthorId> = staged.book.authors().iter().map(|l| l.author_id).collect();
        staged.book.set_authors(&authors)?;
        let soft = FieldChange::unchanged(staged.book.is_soft_deleted());

        for id in previous.iter().filter(|id| !author_ids.contains(id)) {
            self.log
                .push(Mutation::book_author(book_id, *id, ChangeKind::Deleted));
        }
        for id in author_ids {
            let kind = if previous.contains(id) {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            };
            self.log.push(Mutation::book_author(book_id, *id, kind));
        }
        self.log
            .push(Mutation::book(book_id, ChangeKind::Modified, soft));
        Ok(())
    }

    pub fn soft_delete<R: BookReader>(&mut self, reader: &R, id: BookId) -> Result<(), SyncError> {
        self.set_soft_deleted(reader, id, true)
    }

    pub fn restore<R: BookReader>(&mut self, reader: &R, id: BookId) -> Result<(), SyncError> {
        self.set_soft_deleted(reader, id, false)
    }

    /// Physically removes a book, soft-deleted or not.
    pub fn hard_delete<R: BookReader>(&mut self, reader: &R, id: BookId) -> Result<(), SyncError> {
        let staged = self
            .books_for_update(reader, id)?
            .ok_or_else(|| SyncError::not_found("book", id))?;
        let soft = FieldChange::unchanged(staged.book.is_soft_deleted());
        let op = staged.op;
        match op {
            WriteOp::Insert => {
                self.books.remove(&id);
            }
            WriteOp::Update => staged.op = WriteOp::Delete,
            WriteOp::Delete => return Err(SyncError::not_found("book", id)),
        }
        self.log.push(Mutation::book(id, ChangeKind::Deleted, soft));
        Ok(())
    }

    fn set_soft_deleted<R: BookReader>(
        &mut self,
        reader: &R,
        id: BookId,
        soft_deleted: bool,
    ) -> Result<(), SyncError> {
        let staged = self
            .books_for_update(reader, id)?
            .filter(|staged| staged.op != WriteOp::Delete)
            .ok_or_else(|| SyncError::not_found("book", id))?;
        let original = staged.book.is_soft_deleted();
        staged.book.set_soft_deleted(soft_deleted);
        self.log.push(Mutation::book(
            id,
            ChangeKind::Modified,
            FieldChange::new(original, soft_deleted),
        ));
        Ok(())
    }

    /// A staged, writable, not soft-deleted book.
    fn active_book<R: BookReader>(
        &mut self,
        reader: &R,
        id: BookId,
    ) -> Result<&mut StagedBook, SyncError> {
        self.books_for_update(reader, id)?
            .filter(|staged| staged.op != WriteOp::Delete && !staged.book.is_soft_deleted())
            .ok_or_else(|| SyncError::not_found("book", id))
    }

    fn books_for_update<R: BookReader>(
        &mut self,
        reader: &R,
        id: BookId,
    ) -> Result<Option<&mut StagedBook>, SyncError> {
        if !self.books.contains_key(&id) {
            let Some(book) = reader.load_book(&id)? else {
                return Ok(None);
            };
            let original = Some(book.cached().clone());
            self.books.insert(
                id,
                StagedBook {
                    op: WriteOp::Update,
                    book,
                    original,
                },
            );
        }
        Ok(self.books.get_mut(&id))
    }

    fn load_author<R: BookReader>(
        &mut self,
        reader: &R,
        id: AuthorId,
    ) -> Result<&mut StagedAuthor, SyncError> {
        if !self.authors.contains_key(&id) {
            let stored = reader
                .load_author(&id)?
                .ok_or_else(|| SyncError::not_found("author", id))?;
            self.authors.insert(
                id,
                StagedAuthor {
                    op: WriteOp::Update,
                    author: stored.data,
                    expected_version: Some(stored.version),
                },
            );
        }
        self.authors
            .get_mut(&id)
            .ok_or_else(|| SyncError::not_found("author", id))
    }

    /// Reads an author without staging a write for it.
    fn find_author<R: BookReader>(&self, reader: &R, id: AuthorId) -> Result<Author, SyncError> {
        if let Some(staged) = self.authors.get(&id) {
            return Ok(staged.author.clone());
        }
        reader
            .load_author(&id)?
            .map(|stored| stored.data)
            .ok_or_else(|| SyncError::not_found("author", id))
    }

    /// Names for every author linked to the book, staged names first.
    pub(crate) fn author_names<R: BookReader>(
        &self,
        reader: &R,
        book_id: &BookId,
    ) -> Result<BTreeMap<AuthorId, String>, SyncError> {
        let links = match self.books.get(book_id) {
            Some(staged) => staged.book.authors().to_vec(),
            None => reader
                .load_book(book_id)?
                .map(|book| book.authors().to_vec())
                .unwrap_or_default(),
        };

        let mut names = BTreeMap::new();
        for link in links {
            let name = match self.authors.get(&link.author_id) {
                Some(staged) => Some(staged.author.name.clone()),
                None => reader.load_author(&link.author_id)?.map(|a| a.data.name),
            };
            if let Some(name) = name {
                names.insert(link.author_id, name);
            }
        }
        Ok(names)
    }
}

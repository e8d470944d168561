//! BulkLoader - seeds books in batches through the synchronizer.

use tracing::info;

use crate::book::{Author, Book};
use crate::error::SyncError;
use crate::primary::PrimaryStore;
use crate::read_model::ReadModelStore;
use crate::sync::{CancellationToken, Synchronizer};
use crate::unit_of_work::UnitOfWork;

/// Progress after each committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkProgress {
    pub batches_done: usize,
    pub books_done: usize,
    pub total: usize,
}

/// Loads many books, one unit of work per batch.
///
/// Each batch is synchronized like any other unit of work, so listings are
/// written alongside the books. A failed batch stops the load; earlier
/// batches stay committed.
pub struct BulkLoader<'a, P, S> {
    sync: &'a Synchronizer<P, S>,
    batch_size: usize,
    cancel: CancellationToken,
}

impl<'a, P: PrimaryStore, S: ReadModelStore> BulkLoader<'a, P, S> {
    pub fn new(sync: &'a Synchronizer<P, S>) -> Self {
        Self {
            sync,
            batch_size: 100,
            cancel: CancellationToken::default(),
        }
    }

    /// Books per unit of work. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Saves `authors` first, then `books` batch by batch, reporting to
    /// `progress` after every committed batch.
    pub fn load<F>(
        &self,
        authors: Vec<Author>,
        books: Vec<Book>,
        mut progress: F,
    ) -> Result<BulkProgress, SyncError>
    where
        F: FnMut(BulkProgress),
    {
        if !authors.is_empty() {
            let mut uow = UnitOfWork::new();
            for author in authors {
                uow.add_author(author);
            }
            self.sync.synchronize_with(&mut uow, &self.cancel)?;
        }

        let mut state = BulkProgress {
            total: books.len(),
            ..Default::default()
        };
        let mut books = books.into_iter().peekable();
        while books.peek().is_some() {
            let mut uow = UnitOfWork::new();
            let mut in_batch = 0;
            for book in books.by_ref().take(self.batch_size) {
                uow.add_book(book)?;
                in_batch += 1;
            }
            self.sync.synchronize_with(&mut uow, &self.cancel)?;

            state.batches_done += 1;
            state.books_done += in_batch;
            progress(state);
        }

        info!(
            target: "synced::sync",
            books = state.books_done,
            batches = state.batches_done,
            "bulk load finished"
        );
        Ok(state)
    }
}

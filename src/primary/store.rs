use crate::book::{Author, AuthorId, Book, BookId};
use crate::read_model::Versioned;
use crate::unit_of_work::UnitOfWork;

use super::PrimaryStoreError;

/// Read access to durable book state.
///
/// Implemented by the store itself (committed state) and by its open
/// transactions (committed state plus the transaction's own writes).
pub trait BookReader {
    /// Loads a book, including soft-deleted ones.
    fn load_book(&self, id: &BookId) -> Result<Option<Book>, PrimaryStoreError>;

    /// Loads an author together with its row version.
    fn load_author(&self, id: &AuthorId) -> Result<Option<Versioned<Author>>, PrimaryStoreError>;

    /// Ids of every book linked to the author, soft-deleted books included.
    fn books_by_author(&self, id: &AuthorId) -> Result<Vec<BookId>, PrimaryStoreError>;
}

/// The transactional system of record.
pub trait PrimaryStore: BookReader + Send + Sync {
    type Transaction: BookReader;

    /// Opens an explicit transaction.
    fn begin(&self) -> Result<Self::Transaction, PrimaryStoreError>;

    /// Writes the unit of work's staged rows in one implicit transaction.
    /// Returns the number of rows written.
    fn save_changes(&self, uow: &UnitOfWork) -> Result<usize, PrimaryStoreError>;

    /// Writes the unit of work's staged rows inside `tx`. Nothing is visible
    /// to other readers until [`PrimaryStore::commit`].
    fn save_changes_in(
        &self,
        tx: &mut Self::Transaction,
        uow: &UnitOfWork,
    ) -> Result<usize, PrimaryStoreError>;

    fn commit(&self, tx: Self::Transaction) -> Result<(), PrimaryStoreError>;

    fn rollback(&self, tx: Self::Transaction);

    /// Whether re-running the whole unit of work may succeed.
    fn is_transient(&self, err: &PrimaryStoreError) -> bool {
        err.is_transient()
    }
}

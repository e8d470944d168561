//! InMemoryPrimaryStore - HashMap-backed system of record with snapshot
//! transactions, for testing and development.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::book::{Author, AuthorId, Book, BookId};
use crate::read_model::Versioned;
use crate::unit_of_work::{StagedAuthor, StagedBook, UnitOfWork, WriteOp};

use super::{BookConflict, BookReader, ConcurrencyConflict, PrimaryStore, PrimaryStoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum RowKey {
    Book(BookId),
    Author(AuthorId),
}

#[derive(Debug, Clone, Default)]
struct Tables {
    books: HashMap<BookId, Versioned<Book>>,
    authors: HashMap<AuthorId, Versioned<Author>>,
}

impl Tables {
    fn row_version(&self, key: &RowKey) -> Option<u64> {
        match key {
            RowKey::Book(id) => self.books.get(id).map(|row| row.version),
            RowKey::Author(id) => self.authors.get(id).map(|row| row.version),
        }
    }

    /// Checks every staged row, then writes them all. Nothing is written when
    /// any check fails.
    fn apply(&mut self, uow: &UnitOfWork) -> Result<Vec<RowKey>, PrimaryStoreError> {
        for staged in uow.staged_authors() {
            self.check_author(staged)?;
        }
        for staged in uow.staged_books() {
            self.check_book(staged)?;
        }

        let mut written = Vec::new();
        for staged in uow.staged_authors() {
            let id = staged.author.id;
            let version = self.authors.get(&id).map(|row| row.version).unwrap_or(0) + 1;
            self.authors.insert(
                id,
                Versioned {
                    data: staged.author.clone(),
                    version,
                },
            );
            written.push(RowKey::Author(id));
        }
        for staged in uow.staged_books() {
            let id = staged.book.id();
            match staged.op {
                WriteOp::Delete => {
                    self.books.remove(&id);
                }
                WriteOp::Insert | WriteOp::Update => {
                    let version = self.books.get(&id).map(|row| row.version).unwrap_or(0) + 1;
                    self.books.insert(
                        id,
                        Versioned {
                            data: staged.book.clone(),
                            version,
                        },
                    );
                }
            }
            written.push(RowKey::Book(id));
        }
        Ok(written)
    }

    fn check_author(&self, staged: &StagedAuthor) -> Result<(), PrimaryStoreError> {
        let id = staged.author.id;
        let stored = self.authors.get(&id).map(|row| row.version);
        match (staged.op, stored) {
            (WriteOp::Insert, Some(_)) => Err(PrimaryStoreError::Storage(format!(
                "duplicate key: author {} already exists",
                id
            ))),
            (WriteOp::Insert, None) => Ok(()),
            (_, actual) if actual != staged.expected_version => {
                Err(ConcurrencyConflict::Author {
                    author_id: id,
                    expected: staged.expected_version.unwrap_or(0),
                    actual,
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    fn check_book(&self, staged: &StagedBook) -> Result<(), PrimaryStoreError> {
        let id = staged.book.id();
        let stored = self.books.get(&id).map(|row| &row.data);

        if staged.op == WriteOp::Insert {
            if stored.is_some() {
                return Err(PrimaryStoreError::Storage(format!(
                    "duplicate key: book {} already exists",
                    id
                )));
            }
            staged.book.validate()?;
            return Ok(());
        }

        let original = staged.original.clone().unwrap_or_default();
        match stored {
            Some(current) if current.cached() == &original => {}
            current => {
                return Err(ConcurrencyConflict::Book(BookConflict {
                    book_id: id,
                    original,
                    intended: staged.book.cached().clone(),
                    current: current.map(|book| book.cached().clone()),
                })
                .into());
            }
        }

        if staged.op == WriteOp::Update {
            staged.book.validate()?;
        }
        Ok(())
    }
}

impl BookReader for Tables {
    fn load_book(&self, id: &BookId) -> Result<Option<Book>, PrimaryStoreError> {
        Ok(self.books.get(id).map(|row| row.data.clone()))
    }

    fn load_author(&self, id: &AuthorId) -> Result<Option<Versioned<Author>>, PrimaryStoreError> {
        Ok(self.authors.get(id).cloned())
    }

    fn books_by_author(&self, id: &AuthorId) -> Result<Vec<BookId>, PrimaryStoreError> {
        let mut ids: Vec<BookId> = self
            .books
            .values()
            .filter(|row| row.data.references_author(id))
            .map(|row| row.data.id())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Default)]
struct FaultPlan {
    save: VecDeque<PrimaryStoreError>,
    commit: VecDeque<PrimaryStoreError>,
}

/// In-memory primary store.
///
/// Transactions work on a copy of the tables taken at `begin`. Commit is
/// first-committer-wins: if a row the transaction wrote was changed by
/// someone else since `begin`, commit fails with a serialization failure.
///
/// Clone-friendly via Arc.
#[derive(Clone, Default)]
pub struct InMemoryPrimaryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<Mutex<FaultPlan>>,
    next_tx: Arc<AtomicU64>,
}

/// An open snapshot transaction on [`InMemoryPrimaryStore`].
pub struct InMemoryTransaction {
    id: u64,
    working: Tables,
    base_versions: HashMap<RowKey, Option<u64>>,
    written: BTreeSet<RowKey>,
}

impl InMemoryTransaction {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl BookReader for InMemoryTransaction {
    fn load_book(&self, id: &BookId) -> Result<Option<Book>, PrimaryStoreError> {
        self.working.load_book(id)
    }

    fn load_author(&self, id: &AuthorId) -> Result<Option<Versioned<Author>>, PrimaryStoreError> {
        self.working.load_author(id)
    }

    fn books_by_author(&self, id: &AuthorId) -> Result<Vec<BookId>, PrimaryStoreError> {
        self.working.books_by_author(id)
    }
}

impl InMemoryPrimaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Books visible to normal reads, i.e. not soft-deleted.
    pub fn active_books(&self) -> Result<Vec<Book>, PrimaryStoreError> {
        let tables = self.read()?;
        let mut books: Vec<Book> = tables
            .books
            .values()
            .filter(|row| !row.data.is_soft_deleted())
            .map(|row| row.data.clone())
            .collect();
        books.sort_by_key(|book| book.id());
        Ok(books)
    }

    /// Number of physically present book rows.
    pub fn book_count(&self) -> Result<usize, PrimaryStoreError> {
        Ok(self.read()?.books.len())
    }

    /// Makes the next save (plain or transactional) fail with `err`.
    pub fn fail_next_save(&self, err: PrimaryStoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.save.push_back(err);
        }
    }

    /// Makes the next transaction commit fail with `err`.
    pub fn fail_next_commit(&self, err: PrimaryStoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.commit.push_back(err);
        }
    }

    fn injected_save_fault(&self) -> Option<PrimaryStoreError> {
        self.faults.lock().ok()?.save.pop_front()
    }

    fn injected_commit_fault(&self) -> Option<PrimaryStoreError> {
        self.faults.lock().ok()?.commit.pop_front()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, PrimaryStoreError> {
        self.tables
            .read()
            .map_err(|_| PrimaryStoreError::LockPoisoned("read"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, PrimaryStoreError> {
        self.tables
            .write()
            .map_err(|_| PrimaryStoreError::LockPoisoned("write"))
    }
}

impl BookReader for InMemoryPrimaryStore {
    fn load_book(&self, id: &BookId) -> Result<Option<Book>, PrimaryStoreError> {
        self.read()?.load_book(id)
    }

    fn load_author(&self, id: &AuthorId) -> Result<Option<Versioned<Author>>, PrimaryStoreError> {
        self.read()?.load_author(id)
    }

    fn books_by_author(&self, id: &AuthorId) -> Result<Vec<BookId>, PrimaryStoreError> {
        self.read()?.books_by_author(id)
    }
}

impl PrimaryStore for InMemoryPrimaryStore {
    type Transaction = InMemoryTransaction;

    fn begin(&self) -> Result<Self::Transaction, PrimaryStoreError> {
        let working = self.read()?.clone();
        let id = self.next_tx.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(target: "synced::primary", tx = id, "transaction started");
        Ok(InMemoryTransaction {
            id,
            working,
            base_versions: HashMap::new(),
            written: BTreeSet::new(),
        })
    }

    fn save_changes(&self, uow: &UnitOfWork) -> Result<usize, PrimaryStoreError> {
        if let Some(err) = self.injected_save_fault() {
            return Err(err);
        }
        let mut tables = self.write()?;
        let written = tables.apply(uow)?;
        debug!(target: "synced::primary", rows = written.len(), "changes saved");
        Ok(written.len())
    }

    fn save_changes_in(
        &self,
        tx: &mut Self::Transaction,
        uow: &UnitOfWork,
    ) -> Result<usize, PrimaryStoreError> {
        if let Some(err) = self.injected_save_fault() {
            return Err(err);
        }

        let before = tx.working.clone();
        let written = tx.working.apply(uow)?;
        for key in &written {
            tx.base_versions
                .entry(*key)
                .or_insert_with(|| before.row_version(key));
            tx.written.insert(*key);
        }
        debug!(target: "synced::primary", tx = tx.id, rows = written.len(), "changes saved in transaction");
        Ok(written.len())
    }

    fn commit(&self, tx: Self::Transaction) -> Result<(), PrimaryStoreError> {
        if let Some(err) = self.injected_commit_fault() {
            return Err(err);
        }

        let mut tables = self.write()?;
        for key in &tx.written {
            let base = tx.base_versions.get(key).copied().flatten();
            if tables.row_version(key) != base {
                return Err(PrimaryStoreError::SerializationFailure(format!(
                    "row {:?} changed since transaction {} began",
                    key, tx.id
                )));
            }
        }

        for key in &tx.written {
            match key {
                RowKey::Book(id) => match tx.working.books.get(id) {
                    Some(row) => {
                        tables.books.insert(*id, row.clone());
                    }
                    None => {
                        tables.books.remove(id);
                    }
                },
                RowKey::Author(id) => match tx.working.authors.get(id) {
                    Some(row) => {
                        tables.authors.insert(*id, row.clone());
                    }
                    None => {
                        tables.authors.remove(id);
                    }
                },
            }
        }
        debug!(target: "synced::primary", tx = tx.id, rows = tx.written.len(), "transaction committed");
        Ok(())
    }

    fn rollback(&self, tx: Self::Transaction) {
        debug!(target: "synced::primary", tx = tx.id, "transaction rolled back");
    }
}

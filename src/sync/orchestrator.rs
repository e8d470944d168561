//! Synchronizer - drives the primary commit and the projection write as one
//! unit, with bounded retry and one round of conflict resolution.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::book::BookId;
use crate::error::SyncError;
use crate::primary::PrimaryStore;
use crate::read_model::{InMemoryReadModelStore, ReadModelStore};
use crate::unit_of_work::{ChangeKind, UnitOfWork};

use super::applier::ProjectionApplier;
use super::classifier::{BookChange, ChangeClassifier};
use super::config::{RetryConfig, SyncConfig};
use super::resolver::{ConcurrencyResolver, Reconciliation};

/// Caller-owned cancellation flag, observed between attempts only.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What a successful synchronize did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Rows written to the primary store.
    pub primary_writes: usize,
    /// Listing documents written to the secondary store.
    pub projection_writes: usize,
    /// Classified book changes.
    pub changes: usize,
    /// Attempts made, including retries and the resubmit after a conflict.
    pub attempts: usize,
}

/// Keeps book listings in step with the primary store.
///
/// Without a projection store every synchronize is a plain primary save.
pub struct Synchronizer<P, S = InMemoryReadModelStore> {
    primary: P,
    projection: Option<S>,
    config: SyncConfig,
}

impl<P: PrimaryStore> Synchronizer<P> {
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            projection: None,
            config: SyncConfig::default(),
        }
    }
}

impl<P: PrimaryStore, S: ReadModelStore> Synchronizer<P, S> {
    pub fn with_projection<T: ReadModelStore>(self, projection: T) -> Synchronizer<P, T> {
        Synchronizer {
            primary: self.primary,
            projection: Some(projection),
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn projection(&self) -> Option<&S> {
        self.projection.as_ref()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Saves the unit of work and the matching listing changes.
    ///
    /// On success the unit of work is cleared. On failure it is left as is so
    /// the caller can inspect it, [`reconcile`](Self::reconcile) or retry.
    pub fn synchronize(&self, uow: &mut UnitOfWork) -> Result<SyncOutcome, SyncError> {
        self.synchronize_with(uow, &CancellationToken::default())
    }

    pub fn synchronize_with(
        &self,
        uow: &mut UnitOfWork,
        cancel: &CancellationToken,
    ) -> Result<SyncOutcome, SyncError> {
        let retry = &self.config.retry;
        let mut attempts = 0;
        let mut retries: u32 = 0;
        let mut resolved = false;

        loop {
            if cancel.is_cancelled() {
                info!(target: "synced::sync", attempts, "synchronize cancelled");
                return Err(SyncError::Cancelled);
            }
            attempts += 1;
            debug!(target: "synced::sync", attempt = attempts, "synchronize attempt started");

            match self.run_once(uow) {
                Ok(mut outcome) => {
                    outcome.attempts = attempts;
                    uow.clear();
                    info!(
                        target: "synced::sync",
                        primary_writes = outcome.primary_writes,
                        projection_writes = outcome.projection_writes,
                        changes = outcome.changes,
                        attempts,
                        "synchronize committed"
                    );
                    return Ok(outcome);
                }
                Err(SyncError::Concurrency(conflict))
                    if self.config.resolve_conflicts && !resolved =>
                {
                    resolved = true;
                    match ConcurrencyResolver::resolve(&self.primary, uow, &conflict)? {
                        Reconciliation::NotHandled => return Err(SyncError::Concurrency(conflict)),
                        Reconciliation::Resubmit(_) | Reconciliation::Discarded(_) => continue,
                    }
                }
                Err(err) if self.is_transient(&err) && retry.allows(retries) => {
                    let delay = retry.backoff(retries);
                    retries += 1;
                    warn!(
                        target: "synced::sync",
                        error = %err,
                        retry = retries,
                        ?delay,
                        "transient failure, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Attempts to resolve a failure returned by [`synchronize`](Self::synchronize).
    ///
    /// Only book concurrency conflicts are handled; the patched unit of work
    /// can be passed to `synchronize` again.
    pub fn reconcile(
        &self,
        uow: &mut UnitOfWork,
        err: &SyncError,
    ) -> Result<Reconciliation, SyncError> {
        match err {
            SyncError::Concurrency(conflict) => {
                ConcurrencyResolver::resolve(&self.primary, uow, conflict)
            }
            _ => Ok(Reconciliation::NotHandled),
        }
    }

    fn is_transient(&self, err: &SyncError) -> bool {
        match err {
            SyncError::Primary(err) => self.primary.is_transient(err),
            _ => false,
        }
    }

    fn run_once(&self, uow: &UnitOfWork) -> Result<SyncOutcome, SyncError> {
        // Original values are gone once the primary save runs.
        let changes = ChangeClassifier::classify(uow.mutations())?;

        let projection = match &self.projection {
            Some(projection) if !changes.is_empty() => projection,
            _ => {
                let primary_writes = self.primary.save_changes(uow)?;
                return Ok(SyncOutcome {
                    primary_writes,
                    changes: changes.len(),
                    ..Default::default()
                });
            }
        };

        let mut tx = self.primary.begin()?;
        match self.write_both(&mut tx, projection, uow, &changes) {
            Ok(outcome) => match self.primary.commit(tx) {
                Ok(()) => Ok(outcome),
                Err(err) => {
                    warn!(target: "synced::sync", error = %err, "primary commit failed after projection write");
                    self.restore_listings(projection, &changes, SyncError::from(err))
                }
            },
            Err(err) => {
                projection.discard_pending();
                self.primary.rollback(tx);
                warn!(target: "synced::sync", error = %err, "primary transaction rolled back");
                match err {
                    // save_pending ran, so some listings may have landed.
                    SyncError::Inconsistency { .. } => self.restore_listings(projection, &changes, err),
                    err => Err(err),
                }
            }
        }
    }

    /// Re-projects every changed book from committed primary state, then
    /// returns `cause`. Listings that cannot be restored surface as
    /// [`SyncError::ProjectionAhead`].
    fn restore_listings(
        &self,
        projection: &S,
        changes: &BTreeMap<BookId, BookChange>,
        cause: SyncError,
    ) -> Result<SyncOutcome, SyncError> {
        let committed: BTreeMap<BookId, BookChange> = changes
            .keys()
            .map(|id| {
                let change = BookChange {
                    book_id: *id,
                    kind: ChangeKind::Modified,
                };
                (*id, change)
            })
            .collect();

        let restored = ProjectionApplier::apply(&self.primary, projection, &committed)
            .and_then(|_| projection.save_pending().map_err(SyncError::from));
        match restored {
            Ok(written) => {
                info!(target: "synced::projection", books = committed.len(), written, "listings restored from committed state");
                Err(cause)
            }
            Err(restore_err) => {
                projection.discard_pending();
                error!(
                    target: "synced::projection",
                    error = %restore_err,
                    cause = %cause,
                    books = committed.len(),
                    "listings could not be restored"
                );
                Err(SyncError::ProjectionAhead {
                    books: committed.into_keys().collect(),
                    cause: Box::new(cause),
                })
            }
        }
    }

    /// Primary save, projection staging and projection save inside `tx`.
    fn write_both(
        &self,
        tx: &mut P::Transaction,
        projection: &S,
        uow: &UnitOfWork,
        changes: &BTreeMap<BookId, BookChange>,
    ) -> Result<SyncOutcome, SyncError> {
        let primary_writes = self.primary.save_changes_in(tx, uow)?;
        let report = ProjectionApplier::apply(&*tx, projection, changes)?;
        let written = projection.save_pending()?;

        if written != report.touched || report.total() != changes.len() {
            let err = SyncError::Inconsistency {
                expected: changes.len(),
                actual: written + report.already_consistent,
            };
            error!(target: "synced::sync", error = %err, "projection count mismatch");
            return Err(err);
        }

        Ok(SyncOutcome {
            primary_writes,
            projection_writes: written,
            changes: changes.len(),
            attempts: 0,
        })
    }
}

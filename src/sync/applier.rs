//! ProjectionApplier - turns change records into staged listing writes.

use std::collections::BTreeMap;

use tracing::debug;

use crate::book::BookId;
use crate::error::SyncError;
use crate::primary::BookReader;
use crate::read_model::ReadModelStore;
use crate::unit_of_work::ChangeKind;

use super::classifier::BookChange;
use super::projector::{BookListing, Projector};

/// What the applier staged on the secondary store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Document writes staged, one per book.
    pub touched: usize,
    /// Deletes of documents that were already absent.
    pub already_consistent: usize,
}

impl ApplyReport {
    /// Change records accounted for.
    pub fn total(&self) -> usize {
        self.touched + self.already_consistent
    }
}

/// Stages listing writes for classified changes. Nothing is written until the
/// store's `save_pending`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProjectionApplier;

impl ProjectionApplier {
    /// `reader` must see the state being committed, normally the open primary
    /// transaction.
    pub fn apply<R, S>(
        reader: &R,
        store: &S,
        changes: &BTreeMap<BookId, BookChange>,
    ) -> Result<ApplyReport, SyncError>
    where
        R: BookReader,
        S: ReadModelStore,
    {
        let mut report = ApplyReport::default();

        for change in changes.values() {
            let id = change.book_id;
            let listing = match change.kind {
                ChangeKind::Added | ChangeKind::Modified => Projector::project(reader, &id)?,
                ChangeKind::Deleted => None,
                ChangeKind::Unchanged => continue,
            };

            match listing {
                Some(listing) => {
                    // A retried sequence may find its own earlier write.
                    if store.get_model::<BookListing>(&id.to_string())?.is_some() {
                        store.stage_replace(&listing)?;
                    } else {
                        store.stage_insert(&listing)?;
                    }
                    report.touched += 1;
                }
                // Deleted, or the book has no listing anymore.
                None => {
                    if Self::stage_removal(store, &id)? {
                        report.touched += 1;
                    } else {
                        report.already_consistent += 1;
                    }
                }
            }
        }

        debug!(
            target: "synced::projection",
            touched = report.touched,
            already_consistent = report.already_consistent,
            "projection changes staged"
        );
        Ok(report)
    }

    /// Returns false when there is no listing to remove.
    fn stage_removal<S: ReadModelStore>(store: &S, id: &BookId) -> Result<bool, SyncError> {
        let key = id.to_string();
        if store.get_model::<BookListing>(&key)?.is_none() {
            return Ok(false);
        }
        store.stage_delete::<BookListing>(&key)?;
        Ok(true)
    }
}

//! ConcurrencyResolver - delta-based reconciliation of cached book fields.

use std::collections::BTreeSet;

use tracing::warn;

use crate::book::{format_authors_ordered, BookId, CachedFields, Review, ReviewId};
use crate::error::SyncError;
use crate::primary::{BookConflict, BookReader, ConcurrencyConflict};
use crate::unit_of_work::{ChangeKind, MutationTarget, UnitOfWork, WriteOp};

/// Result of handing a conflict to the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The staged write was patched and can be saved again.
    Resubmit(BookId),
    /// The book no longer exists; its staged write was detached.
    Discarded(BookId),
    /// Not a conflict this resolver understands.
    NotHandled,
}

/// Patches a conflicting staged book write in place. Never commits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConcurrencyResolver;

impl ConcurrencyResolver {
    /// Current cached values come from the conflict report, not from a
    /// re-read. `reader` is only used for the narrow reads the review rows
    /// and `authors_ordered` need.
    pub fn resolve<R: BookReader>(
        reader: &R,
        uow: &mut UnitOfWork,
        conflict: &ConcurrencyConflict,
    ) -> Result<Reconciliation, SyncError> {
        let ConcurrencyConflict::Book(conflict) = conflict else {
            return Ok(Reconciliation::NotHandled);
        };
        let id = conflict.book_id;
        if uow.staged_book(&id).is_none() {
            return Ok(Reconciliation::NotHandled);
        }

        let Some(current) = conflict.current.clone() else {
            uow.detach_book(&id);
            warn!(target: "synced::sync", book = %id, "conflicting book no longer exists, write discarded");
            return Ok(Reconciliation::Discarded(id));
        };

        let rebased_reviews = if conflict.original.reviews_differ(&current) {
            Some(Self::rebase_reviews(reader, uow, &id)?)
        } else {
            None
        };
        let authors_ordered = if conflict.original.authors_differ(&current) {
            let names = uow.author_names(reader, &id)?;
            uow.staged_book(&id).map(|staged| {
                format_authors_ordered(staged.book.authors(), |author| {
                    names.get(author).map(String::as_str)
                })
            })
        } else {
            None
        };

        let Some(staged) = uow.staged_book_mut(&id) else {
            return Ok(Reconciliation::NotHandled);
        };
        if staged.op != WriteOp::Delete {
            let mut merged = staged.book.cached().clone();
            if let Some(reviews) = rebased_reviews {
                let (count, average) = merge_review_stats(conflict);
                merged.reviews_count = count;
                merged.reviews_average_votes = average;
                staged.book.set_reviews(reviews);
            }
            if let Some(authors_ordered) = authors_ordered {
                merged.authors_ordered = authors_ordered;
            }
            staged.book.set_cached(merged);
        }
        staged.original = Some(current);

        warn!(target: "synced::sync", book = %id, "concurrency conflict resolved, resubmitting");
        Ok(Reconciliation::Resubmit(id))
    }

    /// The durable review rows plus this unit of work's own additions and
    /// removals.
    fn rebase_reviews<R: BookReader>(
        reader: &R,
        uow: &UnitOfWork,
        id: &BookId,
    ) -> Result<Vec<Review>, SyncError> {
        let mut added = BTreeSet::new();
        let mut removed = BTreeSet::new();
        for mutation in uow.mutations() {
            if let MutationTarget::Review {
                review_id,
                book_id: Some(book_id),
            } = mutation.target
            {
                if book_id != *id {
                    continue;
                }
                match mutation.kind {
                    ChangeKind::Added => {
                        added.insert(review_id);
                    }
                    ChangeKind::Deleted => {
                        removed.insert(review_id);
                    }
                    _ => {}
                }
            }
        }

        let durable = reader
            .load_book(id)?
            .map(|book| book.reviews().to_vec())
            .unwrap_or_default();
        let durable_ids: BTreeSet<ReviewId> = durable.iter().map(|review| review.id).collect();

        let mut reviews: Vec<_> = durable
            .into_iter()
            .filter(|review| !removed.contains(&review.id))
            .collect();
        if let Some(staged) = uow.staged_book(id) {
            reviews.extend(
                staged
                    .book
                    .reviews()
                    .iter()
                    .filter(|review| added.contains(&review.id) && !durable_ids.contains(&review.id))
                    .cloned(),
            );
        }
        Ok(reviews)
    }
}

/// Replays the review delta a conflicting write intended on top of the
/// current values. Zero reviews average to 0.0.
pub fn merge_review_stats(conflict: &BookConflict) -> (u32, f64) {
    let current = conflict.current.clone().unwrap_or_default();
    merge_review_delta(&conflict.original, &conflict.intended, &current)
}

fn merge_review_delta(
    original: &CachedFields,
    intended: &CachedFields,
    current: &CachedFields,
) -> (u32, f64) {
    let delta_count = i64::from(intended.reviews_count) - i64::from(original.reviews_count);
    let delta_stars = star_total(intended) - star_total(original);

    let count = i64::from(current.reviews_count) + delta_count;
    if count <= 0 {
        return (0, 0.0);
    }
    let stars = star_total(current) + delta_stars;
    (count as u32, stars as f64 / count as f64)
}

fn star_total(fields: &CachedFields) -> i64 {
    (fields.reviews_average_votes * f64::from(fields.reviews_count)).round() as i64
}

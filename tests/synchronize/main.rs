//! Integration tests for the synchronizer (primary store + listings).

mod concurrency;

use std::sync::atomic::{AtomicUsize, Ordering};

use synced_rust::{
    BookListing, BookReader, CachedFields, CancellationToken, ChangeClassifier, ChangeKind,
    InMemoryReadModelStore, PrimaryStoreError, ReadModelError, ReadModelStore, RetryConfig,
    Review, SyncError, Synchronizer, UnitOfWork,
};

use faulty::{CancelOnRetryStore, OvercountingStore, SaveOnceStore};
use fixtures::{draft_book, ids, Fixture};

#[test]
fn insert_creates_one_listing_with_review_stats() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Kent Beck"]);

    let mut uow = UnitOfWork::new();
    let book = draft_book("TDD by Example", &authors, &[5, 4, 4]);
    let (count, average) = CachedFields::review_stats(book.reviews());
    let id = uow.add_book(book).unwrap();
    let outcome = fx.sync.synchronize(&mut uow).unwrap();

    assert_eq!(outcome.changes, 1);
    assert_eq!(outcome.projection_writes, 1);
    assert_eq!(fx.listing_count(), 1);

    let listing = fx.listing(id).unwrap();
    assert_eq!(listing.reviews_count, count);
    assert!((listing.reviews_average_votes - average).abs() < 1e-9);
    assert_eq!(listing.authors_ordered, "Kent Beck");
    assert!(uow.is_empty());
}

#[test]
fn book_without_reviews_lists_zero_average() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Kent Beck"]);
    let id = fx.book("Extreme Programming Explained", &authors, &[]);

    let listing = fx.listing(id).unwrap();
    assert_eq!(listing.reviews_count, 0);
    assert_eq!(listing.reviews_average_votes, 0.0);
}

#[test]
fn hard_delete_removes_listing() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Eric Evans"]);
    let id = fx.book("Domain-Driven Design", &authors, &[5]);

    let mut uow = UnitOfWork::new();
    uow.hard_delete(fx.sync.primary(), id).unwrap();
    let outcome = fx.sync.synchronize(&mut uow).unwrap();

    assert_eq!(outcome.projection_writes, 1);
    assert!(fx.listing(id).is_none());
    assert!(fx.primary.load_book(&id).unwrap().is_none());
}

#[test]
fn hard_delete_without_listing_is_a_no_op() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Eric Evans"]);

    // Committed without a projection store, so no listing exists.
    let plain = Synchronizer::new(fx.primary.clone());
    let mut uow = UnitOfWork::new();
    let id = uow.add_book(draft_book("Unlisted", &authors, &[])).unwrap();
    plain.synchronize(&mut uow).unwrap();

    let mut uow = UnitOfWork::new();
    uow.hard_delete(fx.sync.primary(), id).unwrap();
    let outcome = fx.sync.synchronize(&mut uow).unwrap();

    assert_eq!(outcome.changes, 1);
    assert_eq!(outcome.projection_writes, 0);
    assert!(fx.primary.load_book(&id).unwrap().is_none());
}

#[test]
fn soft_delete_and_restore_toggle_listing() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Martin Fowler"]);
    let id = fx.book("Refactoring", &authors, &[4]);

    let mut uow = UnitOfWork::new();
    uow.soft_delete(fx.sync.primary(), id).unwrap();
    fx.sync.synchronize(&mut uow).unwrap();
    assert!(fx.listing(id).is_none());
    assert!(fx.primary.load_book(&id).unwrap().unwrap().is_soft_deleted());

    let mut uow = UnitOfWork::new();
    uow.restore(fx.sync.primary(), id).unwrap();
    fx.sync.synchronize(&mut uow).unwrap();
    assert_eq!(fx.listing(id).unwrap().title, "Refactoring");
}

#[test]
fn toggling_soft_delete_in_one_unit_counts_once() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Martin Fowler"]);
    let id = fx.book("Refactoring", &authors, &[]);

    let mut uow = UnitOfWork::new();
    uow.soft_delete(fx.sync.primary(), id).unwrap();
    uow.restore(fx.sync.primary(), id).unwrap();
    uow.soft_delete(fx.sync.primary(), id).unwrap();

    let changes = ChangeClassifier::classify(uow.mutations()).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[&id].kind, ChangeKind::Deleted);

    let outcome = fx.sync.synchronize(&mut uow).unwrap();
    assert_eq!(outcome.changes, 1);
    assert_eq!(outcome.projection_writes, 1);
    assert!(fx.listing(id).is_none());

    // Already soft-deleted: restore then delete again nets to nothing visible.
    let mut uow = UnitOfWork::new();
    uow.restore(fx.sync.primary(), id).unwrap();
    uow.soft_delete(fx.sync.primary(), id).unwrap();
    let outcome = fx.sync.synchronize(&mut uow).unwrap();
    assert_eq!(outcome.changes, 1);
    assert_eq!(outcome.projection_writes, 0);
    assert_eq!(fx.listing_count(), 0);
}

#[test]
fn renaming_shared_author_updates_every_listing() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Robert Martin", "Micah Martin"]);
    let first = fx.book("Clean Code", &authors[..1], &[]);
    let second = fx.book("Agile Principles", &authors, &[3]);
    let unrelated = fx.book("Other", &authors[1..], &[]);
    let before = fx.listing(unrelated).unwrap();

    let mut uow = UnitOfWork::new();
    uow.rename_author(fx.sync.primary(), authors[0].id, "Uncle Bob")
        .unwrap();

    let changes = ChangeClassifier::classify(uow.mutations()).unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes.values().all(|c| c.kind == ChangeKind::Modified));

    let outcome = fx.sync.synchronize(&mut uow).unwrap();
    assert_eq!(outcome.changes, 2);
    assert_eq!(outcome.projection_writes, 2);
    assert_eq!(fx.listing(first).unwrap().authors_ordered, "Uncle Bob");
    assert_eq!(
        fx.listing(second).unwrap().authors_ordered,
        "Uncle Bob, Micah Martin"
    );
    assert_eq!(fx.listing(unrelated).unwrap(), before);
}

#[test]
fn authors_follow_ordinal_after_reorder_and_rename() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Alpha", "Beta", "Gamma"]);
    let id = fx.book("Ordered", &authors, &[]);
    assert_eq!(fx.listing(id).unwrap().authors_ordered, "Alpha, Beta, Gamma");

    let ids = ids(&authors);
    let reordered = vec![ids[2], ids[0], ids[1]];
    let mut uow = UnitOfWork::new();
    uow.set_authors(fx.sync.primary(), id, &reordered).unwrap();
    fx.sync.synchronize(&mut uow).unwrap();
    assert_eq!(fx.listing(id).unwrap().authors_ordered, "Gamma, Alpha, Beta");

    let mut uow = UnitOfWork::new();
    uow.rename_author(fx.sync.primary(), ids[0], "Aleph")
        .unwrap();
    fx.sync.synchronize(&mut uow).unwrap();
    assert_eq!(fx.listing(id).unwrap().authors_ordered, "Gamma, Aleph, Beta");
}

#[test]
fn review_changes_replace_listing() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);
    let id = fx.book("The Mythical Man-Month", &authors, &[3]);

    let mut uow = UnitOfWork::new();
    let review = uow
        .add_review(fx.sync.primary(), id, Review::new("ann", 5).unwrap())
        .unwrap();
    fx.sync.synchronize(&mut uow).unwrap();
    let listing = fx.listing(id).unwrap();
    assert_eq!((listing.reviews_count, listing.reviews_average_votes), (2, 4.0));

    let mut uow = UnitOfWork::new();
    assert!(uow.remove_review(fx.sync.primary(), id, review).unwrap());
    fx.sync.synchronize(&mut uow).unwrap();
    let listing = fx.listing(id).unwrap();
    assert_eq!((listing.reviews_count, listing.reviews_average_votes), (1, 3.0));
}

#[test]
fn count_mismatch_leaves_primary_unchanged() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);
    let id = fx.book("The Mythical Man-Month", &authors, &[3]);
    let before = fx.primary.load_book(&id).unwrap().unwrap();

    let mut uow = UnitOfWork::new();
    uow.add_review(fx.sync.primary(), id, Review::new("ann", 5).unwrap())
        .unwrap();
    fx.listings.drop_next_writes(1);

    let err = fx.sync.synchronize(&mut uow).unwrap_err();
    assert_eq!(
        err,
        SyncError::Inconsistency {
            expected: 1,
            actual: 0
        }
    );
    assert_eq!(fx.primary.load_book(&id).unwrap().unwrap(), before);
    assert!(!uow.is_empty());
}

#[test]
fn overcounting_store_is_rejected() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);
    let listings = InMemoryReadModelStore::new();
    let sync = Synchronizer::new(fx.primary.clone()).with_projection(OvercountingStore {
        inner: listings.clone(),
    });

    let mut uow = UnitOfWork::new();
    let id = uow.add_book(draft_book("Overcounted", &authors, &[])).unwrap();
    let err = sync.synchronize(&mut uow).unwrap_err();

    assert!(matches!(err, SyncError::Inconsistency { expected: 1, actual: 2 }));
    assert!(fx.primary.load_book(&id).unwrap().is_none());
    assert_eq!(listings.count::<BookListing>().unwrap(), 0);
}

#[test]
fn failed_commit_leaves_no_listing_for_a_new_book() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);

    let mut uow = UnitOfWork::new();
    let id = uow.add_book(draft_book("Never Committed", &authors, &[4])).unwrap();
    fx.primary
        .fail_next_commit(PrimaryStoreError::Storage("log full".into()));
    let err = fx.sync.synchronize(&mut uow).unwrap_err();

    assert_eq!(err, SyncError::Primary(PrimaryStoreError::Storage("log full".into())));
    assert!(fx.primary.load_book(&id).unwrap().is_none());
    assert!(fx.listing(id).is_none());
    assert!(!uow.is_empty());

    let outcome = fx.sync.synchronize(&mut uow).unwrap();
    assert_eq!(outcome.projection_writes, 1);
    assert_eq!(fx.listing(id).unwrap().reviews_count, 1);
}

#[test]
fn failed_commit_restores_the_committed_listing() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);
    let id = fx.book("The Mythical Man-Month", &authors, &[3]);
    let before = fx.listing(id).unwrap();

    let mut uow = UnitOfWork::new();
    uow.add_review(fx.sync.primary(), id, Review::new("ann", 5).unwrap())
        .unwrap();
    uow.update_book(fx.sync.primary(), id, |book| {
        book.title = "The Mythical Man-Month, Anniversary Edition".into();
        Ok(())
    })
    .unwrap();
    fx.primary
        .fail_next_commit(PrimaryStoreError::Storage("log full".into()));
    let err = fx.sync.synchronize(&mut uow).unwrap_err();

    assert!(matches!(err, SyncError::Primary(PrimaryStoreError::Storage(_))));
    assert_eq!(fx.listing(id).unwrap(), before);
    assert_eq!(fx.primary.load_book(&id).unwrap().unwrap().cached().reviews_count, 1);
}

#[test]
fn unrestorable_listings_are_reported() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);
    let listings = InMemoryReadModelStore::new();
    let sync = Synchronizer::new(fx.primary.clone()).with_projection(SaveOnceStore {
        inner: listings.clone(),
        saves: AtomicUsize::new(0),
    });

    let mut uow = UnitOfWork::new();
    let id = uow.add_book(draft_book("Stranded", &authors, &[])).unwrap();
    fx.primary
        .fail_next_commit(PrimaryStoreError::Storage("log full".into()));
    let err = sync.synchronize(&mut uow).unwrap_err();

    match err {
        SyncError::ProjectionAhead { books, cause } => {
            assert_eq!(books, vec![id]);
            assert_eq!(
                *cause,
                SyncError::Primary(PrimaryStoreError::Storage("log full".into()))
            );
        }
        other => panic!("expected ProjectionAhead, got {other:?}"),
    }
    assert!(fx.primary.load_book(&id).unwrap().is_none());
    assert_eq!(listings.count::<BookListing>().unwrap(), 1);
    assert_eq!(listings.pending_count(), 0);
}

#[test]
fn unavailable_listings_roll_back_without_retry() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);
    fx.listings.set_available(false);

    let mut uow = UnitOfWork::new();
    let id = uow.add_book(draft_book("Offline", &authors, &[])).unwrap();
    let err = fx.sync.synchronize(&mut uow).unwrap_err();

    assert!(matches!(err, SyncError::Projection(ReadModelError::Unavailable(_))));
    assert!(fx.primary.load_book(&id).unwrap().is_none());

    fx.listings.set_available(true);
    let outcome = fx.sync.synchronize(&mut uow).unwrap();
    assert_eq!(outcome.attempts, 1);
    assert!(fx.listing(id).is_some());
}

#[test]
fn transient_commit_failure_reruns_whole_sequence() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);

    let mut uow = UnitOfWork::new();
    let id = uow.add_book(draft_book("Retried", &authors, &[4])).unwrap();
    fx.primary
        .fail_next_commit(PrimaryStoreError::Timeout(std::time::Duration::from_millis(30)));
    let outcome = fx.sync.synchronize(&mut uow).unwrap();

    assert_eq!(outcome.attempts, 2);
    assert_eq!(fx.listing_count(), 1);
    assert_eq!(fx.listing(id).unwrap().reviews_count, 1);
    assert!(fx.primary.load_book(&id).unwrap().is_some());
}

#[test]
fn cancellation_between_attempts_stops_the_retry() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);
    let cancel = CancellationToken::new();
    let store = CancelOnRetryStore::new(fx.primary.clone(), cancel.clone());
    let sync = Synchronizer::new(store.clone())
        .with_projection(fx.listings.clone())
        .with_retry(RetryConfig::new().with_max_retries(5).with_backoff(0, 0));

    let mut uow = UnitOfWork::new();
    let id = uow.add_book(draft_book("Interrupted", &authors, &[])).unwrap();
    fx.primary.fail_next_save(PrimaryStoreError::Deadlock);
    let err = sync.synchronize_with(&mut uow, &cancel).unwrap_err();

    assert_eq!(err, SyncError::Cancelled);
    assert_eq!(store.retry_checks.load(Ordering::SeqCst), 1);
    assert!(fx.primary.load_book(&id).unwrap().is_none());
    assert!(fx.listing(id).is_none());
    assert!(!uow.is_empty());

    // the fault was spent by the one attempt that ran
    let outcome = fx.sync.synchronize(&mut uow).unwrap();
    assert_eq!(outcome.attempts, 1);
    assert!(fx.listing(id).is_some());
}

#[test]
fn retries_are_bounded() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);
    for _ in 0..4 {
        fx.primary.fail_next_save(PrimaryStoreError::Deadlock);
    }

    let mut uow = UnitOfWork::new();
    uow.add_book(draft_book("Deadlocked", &authors, &[])).unwrap();
    let err = fx.sync.synchronize(&mut uow).unwrap_err();

    assert_eq!(err, SyncError::Primary(PrimaryStoreError::Deadlock));
    assert_eq!(fx.primary.book_count().unwrap(), 0);
}

#[test]
fn validation_failure_commits_nothing() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Fred Brooks"]);
    let id = fx.book("Valid", &authors, &[]);

    let mut uow = UnitOfWork::new();
    let err = uow
        .update_book(fx.sync.primary(), id, |book| {
            book.title = "   ".into();
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
    assert_eq!(fx.listing(id).unwrap().title, "Valid");
}

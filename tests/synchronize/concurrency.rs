//! Two writers racing on the same book.

use synced_rust::{
    BookConflict, BookReader, CachedFields, ConcurrencyConflict, PrimaryStoreError,
    Reconciliation, Review, SyncConfig, SyncError, Synchronizer, UnitOfWork,
};

use crate::fixtures::{ids, Fixture};

fn review(voter: &str, stars: u8) -> Review {
    Review::new(voter, stars).unwrap()
}

#[test]
fn conflicting_review_counts_are_merged_by_delta() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Grace Hopper"]);
    let id = fx.book("Compilers", &authors, &[2]);

    // Writer B reads (1, 2.0) and adds a 3-star review: intends (2, 2.5).
    let mut late = UnitOfWork::new();
    late.add_review(fx.sync.primary(), id, review("bob", 3)).unwrap();

    // Writer A commits two 5-star reviews first: store now holds (3, 4.0).
    let mut early = UnitOfWork::new();
    early.add_review(fx.sync.primary(), id, review("ann", 5)).unwrap();
    early.add_review(fx.sync.primary(), id, review("cat", 5)).unwrap();
    fx.sync.synchronize(&mut early).unwrap();

    let outcome = fx.sync.synchronize(&mut late).unwrap();
    assert_eq!(outcome.attempts, 2);

    let book = fx.primary.load_book(&id).unwrap().unwrap();
    assert_eq!(book.cached().reviews_count, 4);
    assert_eq!(book.cached().reviews_average_votes, 3.75);
    assert_eq!(book.reviews().len(), 4);
    assert_eq!(CachedFields::review_stats(book.reviews()), (4, 3.75));

    let listing = fx.listing(id).unwrap();
    assert_eq!(listing.reviews_count, 4);
    assert_eq!(listing.reviews_average_votes, 3.75);
}

#[test]
fn reviews_added_through_update_book_survive_a_merge() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Grace Hopper"]);
    let id = fx.book("Compilers", &authors, &[]);

    let mut late = UnitOfWork::new();
    late.update_book(fx.sync.primary(), id, |book| {
        book.description = "second edition".into();
        book.add_review(review("bob", 3))
    })
    .unwrap();

    let mut early = UnitOfWork::new();
    early.add_review(fx.sync.primary(), id, review("ann", 5)).unwrap();
    fx.sync.synchronize(&mut early).unwrap();

    fx.sync.synchronize(&mut late).unwrap();

    let book = fx.primary.load_book(&id).unwrap().unwrap();
    assert_eq!(book.description, "second edition");
    assert_eq!(book.reviews().len(), 2);
    assert_eq!(
        (book.cached().reviews_count, book.cached().reviews_average_votes),
        (2, 4.0)
    );
    assert_eq!(CachedFields::review_stats(book.reviews()), (2, 4.0));
}

#[test]
fn conflicting_author_order_is_rederived() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Ada", "Babbage"]);
    let id = fx.book("Engines", &authors, &[]);
    let ids = ids(&authors);

    let mut reorder = UnitOfWork::new();
    reorder
        .set_authors(fx.sync.primary(), id, &[ids[1], ids[0]])
        .unwrap();

    let mut rename = UnitOfWork::new();
    rename
        .rename_author(fx.sync.primary(), ids[0], "Ada Lovelace")
        .unwrap();
    fx.sync.synchronize(&mut rename).unwrap();

    fx.sync.synchronize(&mut reorder).unwrap();
    assert_eq!(
        fx.listing(id).unwrap().authors_ordered,
        "Babbage, Ada Lovelace"
    );
    let book = fx.primary.load_book(&id).unwrap().unwrap();
    assert_eq!(book.cached().authors_ordered, "Babbage, Ada Lovelace");
}

#[test]
fn write_to_vanished_book_is_discarded() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Grace Hopper"]);
    let id = fx.book("Compilers", &authors, &[]);

    let mut late = UnitOfWork::new();
    late.add_review(fx.sync.primary(), id, review("bob", 3)).unwrap();

    let mut delete = UnitOfWork::new();
    delete.hard_delete(fx.sync.primary(), id).unwrap();
    fx.sync.synchronize(&mut delete).unwrap();

    let outcome = fx.sync.synchronize(&mut late).unwrap();
    assert_eq!(outcome.primary_writes, 0);
    assert_eq!(outcome.projection_writes, 0);
    assert!(fx.primary.load_book(&id).unwrap().is_none());
    assert!(fx.listing(id).is_none());
}

#[test]
fn author_conflicts_are_not_handled() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Grace Hopper"]);
    fx.book("Compilers", &authors, &[]);

    let mut late = UnitOfWork::new();
    late.rename_author(fx.sync.primary(), authors[0].id, "Rear Admiral Hopper")
        .unwrap();
    let mut early = UnitOfWork::new();
    early
        .rename_author(fx.sync.primary(), authors[0].id, "Amazing Grace")
        .unwrap();
    fx.sync.synchronize(&mut early).unwrap();

    let err = fx.sync.synchronize(&mut late).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Concurrency(ConcurrencyConflict::Author { .. })
    ));
    assert_eq!(
        fx.sync.reconcile(&mut late, &err).unwrap(),
        Reconciliation::NotHandled
    );
}

#[test]
fn manual_reconcile_then_resubmit() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Grace Hopper"]);
    let id = fx.book("Compilers", &authors, &[2]);
    let sync = Synchronizer::new(fx.primary.clone())
        .with_projection(fx.listings.clone())
        .with_config(SyncConfig::new().with_conflict_resolution(false));

    let mut late = UnitOfWork::new();
    late.add_review(sync.primary(), id, review("bob", 3)).unwrap();
    let mut early = UnitOfWork::new();
    early.add_review(sync.primary(), id, review("ann", 5)).unwrap();
    early.add_review(sync.primary(), id, review("cat", 5)).unwrap();
    sync.synchronize(&mut early).unwrap();

    let err = sync.synchronize(&mut late).unwrap_err();
    let SyncError::Concurrency(ConcurrencyConflict::Book(conflict)) = &err else {
        panic!("expected a book conflict, got {err:?}");
    };
    assert_eq!(conflict.original.reviews_count, 1);
    assert_eq!(conflict.intended.reviews_count, 2);
    assert_eq!(
        conflict.current.as_ref().map(|c| c.reviews_count),
        Some(3)
    );

    assert_eq!(
        sync.reconcile(&mut late, &err).unwrap(),
        Reconciliation::Resubmit(id)
    );
    let patched = late.staged_book(&id).unwrap();
    assert_eq!(patched.book.cached().reviews_count, 4);
    assert_eq!(patched.original, conflict.current);

    sync.synchronize(&mut late).unwrap();
    assert_eq!(fx.listing(id).unwrap().reviews_average_votes, 3.75);
}

#[test]
fn second_conflict_in_one_call_propagates() {
    let fx = Fixture::new();
    let authors = fx.authors(&["Grace Hopper"]);
    let id = fx.book("Compilers", &authors, &[]);

    let mut late = UnitOfWork::new();
    late.add_review(fx.sync.primary(), id, review("bob", 3)).unwrap();
    let staged = late.staged_book(&id).unwrap();
    let conflict = BookConflict {
        book_id: id,
        original: staged.original.clone().unwrap(),
        intended: staged.book.cached().clone(),
        current: staged.original.clone(),
    };
    for _ in 0..2 {
        fx.primary.fail_next_save(PrimaryStoreError::Concurrency(
            ConcurrencyConflict::Book(conflict.clone()),
        ));
    }

    let err = fx.sync.synchronize(&mut late).unwrap_err();
    assert_eq!(err, SyncError::Concurrency(ConcurrencyConflict::Book(conflict)));
    assert_eq!(
        fx.primary.load_book(&id).unwrap().unwrap().cached().reviews_count,
        0
    );
    assert!(!late.is_empty());
}

//! Projector - flattens a book into its listing document.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use synced_rust_macros::ReadModel;

use crate::book::{Book, BookId};
use crate::error::SyncError;
use crate::primary::BookReader;

/// Denormalized, query-ready copy of a book kept in the secondary store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ReadModel)]
#[readmodel(collection = "book_listings")]
pub struct BookListing {
    #[readmodel(id)]
    pub book_id: BookId,
    pub title: String,
    pub published_on: NaiveDate,
    pub year_published: i32,
    pub estimated_date: bool,
    pub publisher: String,
    pub original_price: f64,
    pub actual_price: f64,
    pub promotional_text: Option<String>,
    pub image_url: Option<String>,
    pub authors_ordered: String,
    pub reviews_count: u32,
    pub reviews_average_votes: f64,
    pub tags: Vec<String>,
    /// `"| a | b |"`, so a tag filter is a substring match on `"| a |"`.
    pub tags_string: String,
}

/// Pure book to listing mapping.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListingBuilder;

impl ListingBuilder {
    pub fn build(book: &Book) -> BookListing {
        let cached = book.cached();
        BookListing {
            book_id: book.id(),
            title: book.title.clone(),
            published_on: book.published_on,
            year_published: book.year_published(),
            estimated_date: book.estimated_date,
            publisher: book.publisher.clone(),
            original_price: book.original_price,
            actual_price: book.actual_price,
            promotional_text: book.promotional_text.clone(),
            image_url: book.image_url.clone(),
            authors_ordered: cached.authors_ordered.clone(),
            reviews_count: cached.reviews_count,
            reviews_average_votes: cached.reviews_average_votes,
            tags: book.tags.clone(),
            tags_string: tags_string(&book.tags),
        }
    }
}

/// Builds listings from durable state.
#[derive(Debug, Default, Clone, Copy)]
pub struct Projector;

impl Projector {
    /// The listing for `id`, or `None` when the book is gone or soft-deleted.
    ///
    /// Pass the open primary transaction as `reader` to project the state
    /// that transaction is about to commit.
    pub fn project<R: BookReader>(reader: &R, id: &BookId) -> Result<Option<BookListing>, SyncError> {
        Ok(reader
            .load_book(id)?
            .filter(|book| !book.is_soft_deleted())
            .map(|book| ListingBuilder::build(&book)))
    }
}

fn tags_string(tags: &[String]) -> String {
    if tags.is_empty() {
        return String::new();
    }
    let mut out = String::from("|");
    for tag in tags {
        out.push(' ');
        out.push_str(tag);
        out.push_str(" |");
    }
    out
}

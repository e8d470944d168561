use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::author::format_authors_ordered;
use super::{Author, AuthorId, BookAuthor, BookId, Review, ReviewId, ValidationError};

/// Derived values stored on the book row.
///
/// They are maintained incrementally by the mutating methods on [`Book`] and
/// double as the row's optimistic-concurrency tokens.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CachedFields {
    pub authors_ordered: String,
    pub reviews_count: u32,
    pub reviews_average_votes: f64,
}

impl CachedFields {
    /// Computes review statistics from scratch. Zero reviews average to 0.0.
    pub fn review_stats(reviews: &[Review]) -> (u32, f64) {
        if reviews.is_empty() {
            return (0, 0.0);
        }
        let total: u32 = reviews.iter().map(|r| u32::from(r.num_stars)).sum();
        let count = reviews.len() as u32;
        (count, f64::from(total) / f64::from(count))
    }

    pub fn reviews_differ(&self, other: &CachedFields) -> bool {
        self.reviews_count != other.reviews_count
            || self.reviews_average_votes != other.reviews_average_votes
    }

    pub fn authors_differ(&self, other: &CachedFields) -> bool {
        self.authors_ordered != other.authors_ordered
    }
}

/// Input for [`Book::create`].
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub description: String,
    pub published_on: NaiveDate,
    pub estimated_date: bool,
    pub publisher: String,
    pub price: f64,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
}

impl NewBook {
    pub fn new(title: impl Into<String>, published_on: NaiveDate, price: f64) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            published_on,
            estimated_date: false,
            publisher: String::new(),
            price,
            image_url: None,
            tags: Vec::new(),
        }
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = publisher.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// The book aggregate: business fields, ordered author links, reviews and the
/// cached fields derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    id: BookId,
    pub title: String,
    pub description: String,
    pub published_on: NaiveDate,
    pub estimated_date: bool,
    pub publisher: String,
    pub original_price: f64,
    pub actual_price: f64,
    pub promotional_text: Option<String>,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    soft_deleted: bool,
    authors: Vec<BookAuthor>,
    reviews: Vec<Review>,
    cached: CachedFields,
}

impl Book {
    /// Creates a book credited to `authors` in the given order.
    pub fn create(draft: NewBook, authors: &[Author]) -> Result<Self, ValidationError> {
        let mut book = Book {
            id: BookId::new(),
            title: draft.title,
            description: draft.description,
            published_on: draft.published_on,
            estimated_date: draft.estimated_date,
            publisher: draft.publisher,
            original_price: draft.price,
            actual_price: draft.price,
            promotional_text: None,
            image_url: draft.image_url,
            tags: draft.tags,
            soft_deleted: false,
            authors: Vec::new(),
            reviews: Vec::new(),
            cached: CachedFields::default(),
        };
        book.set_authors(authors)?;
        book.validate()?;
        Ok(book)
    }

    pub fn id(&self) -> BookId {
        self.id
    }

    pub fn authors(&self) -> &[BookAuthor] {
        &self.authors
    }

    pub fn reviews(&self) -> &[Review] {
        &self.reviews
    }

    pub fn cached(&self) -> &CachedFields {
        &self.cached
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.soft_deleted
    }

    pub fn year_published(&self) -> i32 {
        self.published_on.year()
    }

    pub fn references_author(&self, author_id: &AuthorId) -> bool {
        self.authors.iter().any(|link| link.author_id == *author_id)
    }

    /// Checks the invariants every stored book must hold.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::new("book.title", "must not be empty"));
        }
        if self.authors.is_empty() {
            return Err(ValidationError::new("book.authors", "needs at least one author"));
        }
        if self.original_price < 0.0 || self.actual_price < 0.0 {
            return Err(ValidationError::new("book.price", "must not be negative"));
        }
        Ok(())
    }

    /// Replaces the author links; `authors[i]` gets ordinal `i`.
    pub fn set_authors(&mut self, authors: &[Author]) -> Result<(), ValidationError> {
        if authors.is_empty() {
            return Err(ValidationError::new("book.authors", "needs at least one author"));
        }
        if authors.len() > usize::from(u8::MAX) {
            return Err(ValidationError::new("book.authors", "too many authors"));
        }
        self.authors = authors
            .iter()
            .enumerate()
            .map(|(order, author)| BookAuthor {
                author_id: author.id,
                order: order as u8,
            })
            .collect();
        self.refresh_authors_ordered(|id| {
            authors
                .iter()
                .find(|author| author.id == *id)
                .map(|author| author.name.as_str())
        });
        Ok(())
    }

    /// Recomputes `authors_ordered` from the current links.
    pub fn refresh_authors_ordered<'a, F>(&mut self, name_of: F)
    where
        F: FnMut(&AuthorId) -> Option<&'a str>,
    {
        self.cached.authors_ordered = format_authors_ordered(&self.authors, name_of);
    }

    pub fn add_review(&mut self, review: Review) -> Result<(), ValidationError> {
        if review.num_stars > super::MAX_STARS {
            return Err(ValidationError::new("review.num_stars", "out of range"));
        }
        let count = self.cached.reviews_count;
        let total = self.cached.reviews_average_votes * f64::from(count);
        let new_count = count + 1;
        self.cached.reviews_average_votes =
            (total + f64::from(review.num_stars)) / f64::from(new_count);
        self.cached.reviews_count = new_count;
        self.reviews.push(review);
        Ok(())
    }

    pub fn remove_review(&mut self, review_id: &ReviewId) -> Option<Review> {
        let index = self.reviews.iter().position(|r| r.id == *review_id)?;
        let removed = self.reviews.remove(index);
        let count = self.cached.reviews_count;
        if count <= 1 {
            self.cached.reviews_count = 0;
            self.cached.reviews_average_votes = 0.0;
        } else {
            let total = self.cached.reviews_average_votes * f64::from(count);
            let new_count = count - 1;
            self.cached.reviews_average_votes =
                (total - f64::from(removed.num_stars)) / f64::from(new_count);
            self.cached.reviews_count = new_count;
        }
        Some(removed)
    }

    pub fn add_promotion(&mut self, actual_price: f64, promotional_text: impl Into<String>) -> Result<(), ValidationError> {
        let text = promotional_text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::new("book.promotional_text", "must not be empty"));
        }
        self.actual_price = actual_price;
        self.promotional_text = Some(text);
        Ok(())
    }

    pub fn remove_promotion(&mut self) {
        self.actual_price = self.original_price;
        self.promotional_text = None;
    }

    pub(crate) fn set_soft_deleted(&mut self, soft_deleted: bool) {
        self.soft_deleted = soft_deleted;
    }

    pub(crate) fn set_cached(&mut self, cached: CachedFields) {
        self.cached = cached;
    }

    /// Replaces review rows without touching the cached statistics.
    pub(crate) fn set_reviews(&mut self, reviews: Vec<Review>) {
        self.reviews = reviews;
    }
}

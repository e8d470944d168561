use serde::{Deserialize, Serialize};

use super::{AuthorId, ValidationError};

/// A person credited on one or more books.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    pub name: String,
    pub email: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::new("author.name", "must not be empty"));
        }
        Ok(Self {
            id: AuthorId::new(),
            name,
            email: None,
        })
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Link between a book and one of its authors. `order` is the explicit
/// ordinal used for display; insertion order carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookAuthor {
    pub author_id: AuthorId,
    pub order: u8,
}

/// Joins author names in ascending link order.
///
/// Links whose author cannot be found are skipped.
pub fn format_authors_ordered<'a, F>(links: &[BookAuthor], mut name_of: F) -> String
where
    F: FnMut(&AuthorId) -> Option<&'a str>,
{
    let mut ordered: Vec<&BookAuthor> = links.iter().collect();
    ordered.sort_by_key(|link| link.order);
    ordered
        .into_iter()
        .filter_map(|link| name_of(&link.author_id))
        .collect::<Vec<_>>()
        .join(super::AUTHORS_SEPARATOR)
}

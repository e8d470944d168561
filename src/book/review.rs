use serde::{Deserialize, Serialize};

use super::{ReviewId, ValidationError};

pub const MAX_STARS: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub voter_name: String,
    pub num_stars: u8,
    pub comment: Option<String>,
}

impl Review {
    pub fn new(voter_name: impl Into<String>, num_stars: u8) -> Result<Self, ValidationError> {
        if num_stars > MAX_STARS {
            return Err(ValidationError::new(
                "review.num_stars",
                format!("must be between 0 and {}", MAX_STARS),
            ));
        }
        Ok(Self {
            id: ReviewId::new(),
            voter_name: voter_name.into(),
            num_stars,
            comment: None,
        })
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

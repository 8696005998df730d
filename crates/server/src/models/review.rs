//! Product reviews.
//!
//! A review is written either by a known customer or by a guest who leaves
//! an email address. Reviews stay hidden until an admin approves them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sagebrush_core::{CustomerId, Email, ProductId, ReviewId};

use super::{ValidationError, http_url, optional_text, required_text};

/// Most images a single review may carry.
pub const MAX_REVIEW_IMAGES: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub customer_id: Option<CustomerId>,
    /// Only exposed through admin routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_email: Option<Email>,
    pub is_guest_review: bool,
    pub author_name: String,
    pub rating: i16,
    pub title: Option<String>,
    pub body: String,
    pub images: Vec<String>,
    pub is_approved: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Copy without the guest's email, for storefront responses.
    #[must_use]
    pub fn public(mut self) -> Self {
        self.guest_email = None;
        self
    }
}

/// Who wrote a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAuthor {
    Customer(CustomerId),
    Guest(Email),
}

/// Body of `POST /store/products/{id}/reviews`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReviewInput {
    pub author_name: String,
    pub rating: i64,
    pub title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Required when the request carries no customer identity.
    pub guest_email: Option<String>,
}

/// A validated review ready to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub product_id: ProductId,
    pub author: ReviewAuthor,
    pub author_name: String,
    pub rating: i16,
    pub title: Option<String>,
    pub body: String,
    pub images: Vec<String>,
}

/// Clamp a submitted rating into `1..=5`.
#[must_use]
pub fn clamp_rating(rating: i64) -> i16 {
    // clamp first, so the cast is lossless
    #[allow(clippy::cast_possible_truncation)]
    let clamped = rating.clamp(1, 5) as i16;
    clamped
}

impl SubmitReviewInput {
    /// Validate and attach an author.
    ///
    /// A known customer always wins over a supplied guest email.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for blank text, too many images, non-http
    /// image URLs, or a guest submission without a valid email.
    pub fn validate(
        self,
        product_id: ProductId,
        customer: Option<CustomerId>,
    ) -> Result<NewReview, ValidationError> {
        let author = match customer {
            Some(id) => ReviewAuthor::Customer(id),
            None => {
                let raw = self
                    .guest_email
                    .as_deref()
                    .filter(|e| !e.trim().is_empty())
                    .ok_or_else(|| ValidationError::new("guest_email is required for guest reviews"))?;
                let email = Email::parse(raw)
                    .map_err(|e| ValidationError(format!("guest_email: {e}")))?;
                ReviewAuthor::Guest(email)
            }
        };

        if self.images.len() > MAX_REVIEW_IMAGES {
            return Err(ValidationError(format!(
                "a review may have at most {MAX_REVIEW_IMAGES} images"
            )));
        }
        let images = self
            .images
            .iter()
            .map(|url| http_url("images", url))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NewReview {
            product_id,
            author,
            author_name: required_text("author_name", &self.author_name, 100)?,
            rating: clamp_rating(self.rating),
            title: optional_text("title", self.title.as_deref(), 200)?,
            body: required_text("body", &self.body, 5000)?,
            images,
        })
    }
}

/// Aggregate of approved reviews for a product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub review_count: i64,
    /// `None` when there are no approved reviews.
    pub average_rating: Option<f64>,
}

/// Query filters for the admin review list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewFilter {
    pub approved: Option<bool>,
    pub product_id: Option<ProductId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

//! Product reviews.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use tracing::instrument;

use sagebrush_core::ProductId;

use crate::db::{CatalogRepository, Page, ReviewRepository};
use crate::error::AppError;
use crate::middleware::MaybeCustomer;
use crate::models::{Review, ReviewSummary, SubmitReviewInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products/{id}/reviews", get(list).post(submit))
        .route("/products/{id}/reviews/summary", get(summary))
}

/// Approved reviews, featured first and newest next.
async fn list(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Review>>, AppError> {
    let reviews = ReviewRepository::new(state.pool())
        .list_visible(product_id, page)
        .await?;
    Ok(Json(reviews.into_iter().map(Review::public).collect()))
}

async fn summary(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
) -> Result<Json<ReviewSummary>, AppError> {
    Ok(Json(ReviewRepository::new(state.pool()).summary(product_id).await?))
}

/// Submit a review as the signed-in customer or as a guest with an email.
///
/// New reviews wait for moderation before they are listed.
#[instrument(skip(state, input))]
async fn submit(
    MaybeCustomer(customer): MaybeCustomer,
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Json(input): Json<SubmitReviewInput>,
) -> Result<(StatusCode, Json<Review>), AppError> {
    let review = input.validate(product_id, customer)?;

    if !CatalogRepository::new(state.pool())
        .product_exists(product_id)
        .await?
    {
        return Err(AppError::not_found("product"));
    }

    let created = ReviewRepository::new(state.pool()).create(&review).await?;
    tracing::info!(
        review_id = %created.id,
        %product_id,
        guest = created.is_guest_review,
        "Review submitted"
    );
    Ok((StatusCode::CREATED, Json(created.public())))
}

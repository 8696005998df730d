//! Review moderation.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Deserialize;

use sagebrush_core::ReviewId;

use crate::db::ReviewRepository;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{Review, ReviewFilter};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reviews", get(list))
        .route("/reviews/{id}", delete(remove))
        .route("/reviews/{id}/approve", post(approve))
        .route("/reviews/{id}/feature", post(feature))
}

/// `?value=false` undoes the flag; it is set when omitted.
#[derive(Debug, Deserialize)]
struct Flag {
    #[serde(default = "default_true")]
    value: bool,
}

const fn default_true() -> bool {
    true
}

async fn list(
    _: RequireAdmin,
    State(state): State<AppState>,
    Query(filter): Query<ReviewFilter>,
) -> Result<Json<Vec<Review>>, AppError> {
    let reviews = ReviewRepository::new(state.pool()).list(&filter).await?;
    Ok(Json(reviews))
}

async fn approve(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    Query(flag): Query<Flag>,
) -> Result<Json<Review>, AppError> {
    let review = ReviewRepository::new(state.pool())
        .set_approved(id, flag.value)
        .await?;
    tracing::info!(review_id = %id, approved = flag.value, "Review moderated");
    Ok(Json(review))
}

async fn feature(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
    Query(flag): Query<Flag>,
) -> Result<Json<Review>, AppError> {
    let review = ReviewRepository::new(state.pool())
        .set_featured(id, flag.value)
        .await?;
    Ok(Json(review))
}

async fn remove(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode, AppError> {
    ReviewRepository::new(state.pool()).delete(id).await?;
    tracing::info!(review_id = %id, "Review deleted");
    Ok(StatusCode::NO_CONTENT)
}

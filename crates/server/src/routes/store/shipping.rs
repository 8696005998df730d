//! Shipping quotes for the cart.

use axum::{Json, Router, extract::State, routing::post};
use serde::Serialize;

use crate::db::ShippingSettingsRepository;
use crate::error::AppError;
use crate::models::{RateRequest, ShippingQuote};
use crate::services::shipping;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/shipping/rates", post(rates))
}

#[derive(Debug, Serialize)]
struct RatesResponse {
    quotes: Vec<ShippingQuote>,
}

/// Quote shipping for a subtotal, destination and parcel weight.
///
/// Carrier failures fall back to the flat rate, so this only fails on bad
/// input or an unreachable database.
async fn rates(
    State(state): State<AppState>,
    Json(input): Json<RateRequest>,
) -> Result<Json<RatesResponse>, AppError> {
    let request = input.validate()?;
    let settings = ShippingSettingsRepository::new(state.pool()).get().await?;
    let quotes = shipping::quote(&settings, &request, state.shipping()).await;
    Ok(Json(RatesResponse { quotes }))
}

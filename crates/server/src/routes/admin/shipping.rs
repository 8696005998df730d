//! Store-wide shipping settings.

use axum::{Json, Router, extract::State, routing::get};

use crate::db::ShippingSettingsRepository;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{ShippingSettings, ShippingSettingsInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/shipping-settings", get(show).put(save))
}

async fn show(
    _: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<ShippingSettings>, AppError> {
    Ok(Json(ShippingSettingsRepository::new(state.pool()).get().await?))
}

async fn save(
    _: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<ShippingSettingsInput>,
) -> Result<Json<ShippingSettings>, AppError> {
    let input = input.validate()?;
    let settings = ShippingSettingsRepository::new(state.pool())
        .save(&input)
        .await?;
    tracing::info!(
        flat_rate = settings.flat_rate_cents.get(),
        live = settings.use_live_rates,
        "Shipping settings saved"
    );
    Ok(Json(settings))
}

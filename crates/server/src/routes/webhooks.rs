//! Payment provider webhook endpoint.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    middleware::from_fn_with_state,
    routing::post,
};
use chrono::Utc;
use serde::Serialize;

use crate::error::AppError;
use crate::middleware::webhook_rate_limit;
use crate::services::run_once;
use crate::services::webhooks::{PaymentEvent, SIGNATURE_HEADER, WebhookProcessor, verify_signature};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/webhooks/payments", post(payment_webhook))
        .layer(from_fn_with_state(state.clone(), webhook_rate_limit))
}

#[derive(Debug, Serialize)]
struct WebhookAck {
    received: bool,
    duplicate: bool,
}

/// Verify, de-duplicate and apply one webhook delivery.
///
/// Returns 401 for a bad signature and 400 for an unparseable event. A
/// processing error answers 5xx with the claim released, so the provider
/// retries the delivery.
async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    verify_signature(
        &state.config().payment.webhook_secret,
        signature,
        &body,
        Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Rejected webhook signature");
        AppError::Unauthorized("Invalid webhook signature".to_string())
    })?;

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid event payload: {e}")))?;

    let processor = WebhookProcessor::new(state.pool(), &state.config().loyalty);
    let outcome = run_once(state.idempotency(), &event.id, &event.event_type, || async {
        processor.process(&event).await.map_err(AppError::from)
    })
    .await?;

    Ok(Json(WebhookAck {
        received: true,
        duplicate: outcome.is_duplicate(),
    }))
}

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::{errors::ServiceError, services::webhook::SIGNATURE_HEADER, AppState};

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body(content = String, description = "Raw provider event; signed with HMAC-SHA256 in x-webhook-signature"),
    params(("x-webhook-signature" = String, Header, description = "Hex HMAC-SHA256 of the raw body")),
    responses(
        (status = 200, description = "Webhook accepted; unreadable or unknown events are acknowledged and ignored"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 503, description = "Webhook secret not configured", body = crate::errors::ErrorResponse),
        (status = 500, description = "Processing failed; provider should redeliver", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.services.webhooks.handle(signature, &body).await?;
    Ok((
        StatusCode::OK,
        Json(json!({ "received": true, "outcome": outcome })),
    ))
}

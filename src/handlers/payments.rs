use axum::{extract::State, response::Json, routing::post, Router};

use crate::{
    auth::AuthUser,
    services::{
        checkout::{CheckoutRequest, CheckoutResponse},
        reconciliation::{ReconcileRequest, ReconcileResponse},
    },
    ApiResponse, ApiResult, AppState,
};

/// Authenticated payment routes. The provider webhook is mounted separately.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/reconcile", post(reconcile_payment))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/checkout",
    summary = "Start an online payment",
    description = "Opens (or reuses) a provider-hosted checkout for a confirmed, unpaid order. An older checkout found paid at the provider confirms the order instead (`paymentConfirmed`).",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout ready", body = ApiResponse<CheckoutResponse>),
        (status = 403, description = "Not the ordering customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not awaiting payment, or an older checkout for another amount is still open", body = crate::errors::ErrorResponse),
        (status = 422, description = "Online payment unavailable for this restaurant", body = crate::errors::ErrorResponse),
        (status = 502, description = "Provider rejected the request", body = crate::errors::ErrorResponse),
        (status = 503, description = "Provider unreachable, retry later", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CheckoutRequest>,
) -> ApiResult<CheckoutResponse> {
    let checkout = state
        .services
        .checkout
        .start_checkout(&auth_user, request)
        .await?;
    Ok(Json(ApiResponse::success(checkout)))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/reconcile",
    summary = "Ask the provider whether a pending payment went through",
    description = "Polls for a bounded window. A timeout reports `confirmed: false` and changes nothing.",
    request_body = ReconcileRequest,
    responses(
        (status = 200, description = "Reconciliation result", body = ApiResponse<ReconcileResponse>),
        (status = 403, description = "Not the ordering customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Provider rejected the request", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn reconcile_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<ReconcileRequest>,
) -> ApiResult<ReconcileResponse> {
    let result = state
        .services
        .reconciliation
        .reconcile(&auth_user, request.order_id)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

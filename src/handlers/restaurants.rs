use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::restaurants::{
        PaymentCredentialsRequest, PaymentSettingsResponse, RegisterRestaurantRequest,
        RestaurantResponse,
    },
    ApiResponse, ApiResult, AppState,
};

pub fn restaurant_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(register_restaurant))
        .route("/:id/payment-credentials", put(put_payment_credentials))
        .route("/:id/payment-settings", get(get_payment_settings))
}

#[utoipa::path(
    post,
    path = "/api/v1/restaurants",
    summary = "Register a restaurant owned by the caller",
    request_body = RegisterRestaurantRequest,
    responses(
        (status = 201, description = "Restaurant registered", body = ApiResponse<RestaurantResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Restaurant account required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Restaurants"
)]
pub async fn register_restaurant(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<RegisterRestaurantRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RestaurantResponse>>), ServiceError> {
    auth_user.require_restaurant()?;
    let restaurant = state
        .services
        .restaurants
        .register(auth_user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(restaurant))))
}

#[utoipa::path(
    put,
    path = "/api/v1/restaurants/{id}/payment-credentials",
    summary = "Store the restaurant's payment provider secret key",
    description = "The key is write-only; responses only say whether one is configured.",
    params(("id" = Uuid, Path, description = "Restaurant ID")),
    request_body = PaymentCredentialsRequest,
    responses(
        (status = 200, description = "Credentials stored", body = ApiResponse<PaymentSettingsResponse>),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Restaurant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Restaurants"
)]
pub async fn put_payment_credentials(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<PaymentCredentialsRequest>,
) -> ApiResult<PaymentSettingsResponse> {
    auth_user.require_restaurant()?;
    let settings = state
        .services
        .restaurants
        .put_credentials(id, auth_user.user_id, request)
        .await?;
    Ok(Json(ApiResponse::success(settings)))
}

#[utoipa::path(
    get,
    path = "/api/v1/restaurants/{id}/payment-settings",
    summary = "Whether online payment is configured",
    params(("id" = Uuid, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Payment settings", body = ApiResponse<PaymentSettingsResponse>),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Restaurant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Restaurants"
)]
pub async fn get_payment_settings(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<PaymentSettingsResponse> {
    auth_user.require_restaurant()?;
    let settings = state
        .services
        .restaurants
        .payment_settings(id, auth_user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(settings)))
}

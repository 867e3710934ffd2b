use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::{
        order_status::{SelectPaymentMethodRequest, UpdateOrderStatusRequest},
        orders::{CreateOrderRequest, ListOrdersQuery, OrderListResponse, OrderResponse},
        payment_ledger::PaymentAttemptList,
    },
    ApiResponse, ApiResult, AppState,
};

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_order_status))
        .route("/:id/payment-method", post(select_payment_method))
        .route("/:id/payments", get(list_order_payments))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place an order",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid order", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Customer account required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Restaurant not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    auth_user.require_customer()?;
    let order = state
        .services
        .orders
        .create_order(auth_user.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List the caller's orders",
    description = "Customers see their own orders; restaurant users see orders for restaurants they own.",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = ApiResponse<OrderListResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Restaurant belongs to another owner", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<OrderListResponse> {
    let orders = state.services.orders.list_orders(&auth_user, query).await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get an order with its items",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order", body = ApiResponse<OrderResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not a party to this order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderResponse> {
    let order = state.services.orders.get_order(id, &auth_user).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Move an order through its lifecycle",
    description = "The owning restaurant accepts, progresses or cancels; a customer may only cancel their own pending order.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 403, description = "Actor may not make this transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Invalid transition or concurrent update", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .order_status
        .update_status(id, &auth_user, request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment-method",
    summary = "Choose cash or online payment",
    description = "Only for confirmed, unpaid orders. Cash confirms payment immediately.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = SelectPaymentMethodRequest,
    responses(
        (status = 200, description = "Payment method recorded", body = ApiResponse<OrderResponse>),
        (status = 403, description = "Not the ordering customer", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn select_payment_method(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<SelectPaymentMethodRequest>,
) -> ApiResult<OrderResponse> {
    let order = state
        .services
        .order_status
        .select_payment_method(id, &auth_user, request.payment_method)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/payments",
    summary = "Payment attempts of an order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Ledger entries, newest first", body = ApiResponse<PaymentAttemptList>),
        (status = 403, description = "Not a party to this order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_order_payments(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<PaymentAttemptList> {
    let attempts = state
        .services
        .ledger
        .attempts_visible_to(id, &auth_user)
        .await?;
    Ok(Json(ApiResponse::success(attempts)))
}

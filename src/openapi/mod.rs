use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Food Ordering API",
        version = "1.0.0",
        description = r#"
# Food Ordering API

Order lifecycle and payment handling for restaurant food ordering.

## Features

- **Orders**: Customers place delivery or collection orders; restaurants drive them through the lifecycle
- **Payments**: Cash on delivery or a provider-hosted online checkout
- **Reconciliation**: Signed provider webhooks plus a bounded polling fallback, both confirming through one idempotent ledger

## Authentication

Every endpoint except the provider webhook requires a bearer token issued by the authentication provider:

```
Authorization: Bearer <your-jwt-token>
```

The provider webhook is authenticated with an HMAC-SHA256 signature of the raw body in `x-webhook-signature`.

## Error Handling

Errors share one body shape:

```json
{
  "error": "Conflict",
  "code": "InvalidTransition",
  "message": "Invalid transition: cannot move order from 'pending' to 'preparing'",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order placement and lifecycle"),
        (name = "Payments", description = "Checkout, reconciliation and provider webhooks"),
        (name = "Restaurants", description = "Restaurant registration and payment settings")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::select_payment_method,
        crate::handlers::orders::list_order_payments,

        crate::handlers::payments::create_checkout,
        crate::handlers::payments::reconcile_payment,
        crate::handlers::payment_webhooks::payment_webhook,

        crate::handlers::restaurants::register_restaurant,
        crate::handlers::restaurants::put_payment_credentials,
        crate::handlers::restaurants::get_payment_settings,
    ),
    components(
        schemas(
            crate::ResponseMeta,

            crate::models::OrderStatus,
            crate::models::OrderType,
            crate::models::PaymentMethod,
            crate::models::PaymentAttemptStatus,

            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderItemRequest,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderListResponse,
            crate::services::order_status::UpdateOrderStatusRequest,
            crate::services::order_status::SelectPaymentMethodRequest,

            crate::services::checkout::CheckoutRequest,
            crate::services::checkout::CheckoutResponse,
            crate::services::reconciliation::ReconcileRequest,
            crate::services::reconciliation::ReconcileResponse,
            crate::services::payment_ledger::PaymentAttemptResponse,
            crate::services::payment_ledger::PaymentAttemptList,

            crate::services::restaurants::RegisterRestaurantRequest,
            crate::services::restaurants::RestaurantResponse,
            crate::services::restaurants::PaymentCredentialsRequest,
            crate::services::restaurants::PaymentSettingsResponse,

            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

/// Registers the `Bearer` scheme referenced by the authenticated paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

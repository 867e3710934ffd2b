#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use foodorder_api::{
    auth::{AuthConfig, AuthService, Role},
    config::AppConfig,
    db::{self, DbConfig},
    handlers::AppServices,
    payment_provider::HttpPaymentProvider,
    services::webhook::SIGNATURE_HEADER,
    AppState,
};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::MockServer;

pub const WEBHOOK_SECRET: &str = "whsec_integration_test_secret";
pub const RESTAURANT_SECRET_KEY: &str = "sk_test_restaurant_123";

/// Application backed by an in-memory SQLite database and a mock payment provider.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: MockServer,
    auth_service: Arc<AuthService>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller adjust the configuration.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let provider = MockServer::start().await;

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "integration_test_jwt_secret_0123456789".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.payment_provider_base_url = provider.uri();
        cfg.payment_provider_timeout_secs = 2;
        cfg.payment_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        cfg.reconciliation_window_ms = 300;
        cfg.reconciliation_interval_ms = 50;
        customize(&mut cfg);

        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let http_provider =
            HttpPaymentProvider::new(&cfg.payment_provider_base_url, cfg.payment_provider_timeout())
                .expect("provider client");
        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let services = AppServices::new(db_arc.clone(), &cfg, Arc::new(http_provider));

        let state = AppState {
            db: db_arc,
            config: cfg,
            auth: auth_service.clone(),
            services,
        };

        Self {
            router: foodorder_api::app_router(state.clone()),
            state,
            provider,
            auth_service,
        }
    }

    pub fn token(&self, user_id: Uuid, role: Role) -> String {
        self.auth_service
            .issue_token(user_id, role)
            .expect("issue test token")
    }

    pub fn customer_token(&self) -> (Uuid, String) {
        let id = Uuid::new_v4();
        (id, self.token(id, Role::Customer))
    }

    pub fn restaurant_token(&self) -> (Uuid, String) {
        let id = Uuid::new_v4();
        (id, self.token(id, Role::Restaurant))
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Posts a raw webhook body, signing it with `secret` when given.
    pub async fn webhook(&self, body: &Value, secret: Option<&str>) -> Response {
        let raw = body.to_string();
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SIGNATURE_HEADER, sign(secret, raw.as_bytes()));
        }
        let request = builder.body(Body::from(raw)).expect("request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    /// Registers a restaurant and stores its provider secret key.
    pub async fn restaurant_with_credentials(&self, owner_token: &str) -> Uuid {
        let response = self
            .request(
                Method::POST,
                "/api/v1/restaurants",
                Some(owner_token),
                Some(json!({ "name": "Mama's Kitchen" })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let restaurant_id = response_json(response).await["data"]["id"]
            .as_str()
            .expect("restaurant id")
            .parse()
            .expect("uuid");

        let response = self
            .request(
                Method::PUT,
                &format!("/api/v1/restaurants/{restaurant_id}/payment-credentials"),
                Some(owner_token),
                Some(json!({ "secret_key": RESTAURANT_SECRET_KEY })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        restaurant_id
    }

    /// Places a R150.00 delivery order (2 x 75.00) and returns its id.
    pub async fn place_order(&self, customer_token: &str, restaurant_id: Uuid) -> Uuid {
        let response = self
            .request(
                Method::POST,
                "/api/v1/orders",
                Some(customer_token),
                Some(json!({
                    "restaurant_id": restaurant_id,
                    "order_type": "delivery",
                    "delivery_address": "12 Long Street, Cape Town",
                    "items": [{ "item_name": "Bunny chow", "price": "75.00", "quantity": 2 }]
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response_json(response).await["data"]["id"]
            .as_str()
            .expect("order id")
            .parse()
            .expect("uuid")
    }

    pub async fn set_status(&self, token: &str, order_id: Uuid, status: &str) -> Response {
        self.request(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(token),
            Some(json!({ "status": status })),
        )
        .await
    }

    pub async fn get_order(&self, token: &str, order_id: Uuid) -> Value {
        let response = self
            .request(
                Method::GET,
                &format!("/api/v1/orders/{order_id}"),
                Some(token),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        response_json(response).await["data"].clone()
    }
}

pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

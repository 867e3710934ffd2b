//! Order placement, lifecycle and access control through the HTTP router.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/orders", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["code"], "Unauthorized");

    let response = app
        .request(Method::GET, "/api/v1/orders", Some("not-a-jwt"), None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn placed_order_totals_its_items() {
    let app = TestApp::new().await;
    let (_, restaurant_token) = app.restaurant_token();
    let (customer_id, customer_token) = app.customer_token();
    let restaurant_id = app.restaurant_with_credentials(&restaurant_token).await;

    let order_id = app.place_order(&customer_token, restaurant_id).await;
    let order = app.get_order(&customer_token, order_id).await;

    assert_eq!(order["status"], "pending");
    assert_eq!(order["customer_id"], customer_id.to_string());
    assert_eq!(order["payment_confirmed"], false);
    assert!(order["payment_method"].is_null());
    assert_eq!(order["items"].as_array().map(Vec::len), Some(1));
    let total: f64 = order["total_amount"]
        .as_str()
        .expect("decimal as string")
        .parse()
        .expect("numeric total");
    assert_eq!(total, 150.0);

    // The restaurant sees the order too.
    let seen_by_restaurant = app.get_order(&restaurant_token, order_id).await;
    assert_eq!(seen_by_restaurant["id"], order_id.to_string());
}

#[tokio::test]
async fn order_for_unknown_restaurant_is_not_found() {
    let app = TestApp::new().await;
    let (_, customer_token) = app.customer_token();

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(&customer_token),
            Some(json!({
                "restaurant_id": Uuid::new_v4(),
                "order_type": "collection",
                "items": [{ "item_name": "Vetkoek", "price": "25.00", "quantity": 1 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_validation_rejects_bad_items() {
    let app = TestApp::new().await;
    let (_, restaurant_token) = app.restaurant_token();
    let (_, customer_token) = app.customer_token();
    let restaurant_id = app.restaurant_with_credentials(&restaurant_token).await;

    for items in [
        json!([]),
        json!([{ "item_name": "Pap", "price": "-1.00", "quantity": 1 }]),
        json!([{ "item_name": "Pap", "price": "10.00", "quantity": 0 }]),
    ] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/orders",
                Some(&customer_token),
                Some(json!({
                    "restaurant_id": restaurant_id,
                    "order_type": "collection",
                    "items": items
                })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "items: {items}");
    }
}

#[tokio::test]
async fn restaurants_cannot_place_orders() {
    let app = TestApp::new().await;
    let (_, restaurant_token) = app.restaurant_token();
    let restaurant_id = app.restaurant_with_credentials(&restaurant_token).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(&restaurant_token),
            Some(json!({
                "restaurant_id": restaurant_id,
                "order_type": "collection",
                "items": [{ "item_name": "Samoosa", "price": "8.50", "quantity": 4 }]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn skipping_a_lifecycle_step_is_an_invalid_transition() {
    let app = TestApp::new().await;
    let (_, restaurant_token) = app.restaurant_token();
    let (_, customer_token) = app.customer_token();
    let restaurant_id = app.restaurant_with_credentials(&restaurant_token).await;
    let order_id = app.place_order(&customer_token, restaurant_id).await;

    let response = app.set_status(&restaurant_token, order_id, "preparing").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["code"], "InvalidTransition");
    assert_eq!(
        body["message"],
        "Invalid transition: cannot move order from 'pending' to 'preparing'"
    );

    let order = app.get_order(&customer_token, order_id).await;
    assert_eq!(order["status"], "pending");
}

#[tokio::test]
async fn delivery_order_walks_the_full_lifecycle() {
    let app = TestApp::new().await;
    let (_, restaurant_token) = app.restaurant_token();
    let (_, customer_token) = app.customer_token();
    let restaurant_id = app.restaurant_with_credentials(&restaurant_token).await;
    let order_id = app.place_order(&customer_token, restaurant_id).await;

    assert_eq!(
        app.set_status(&restaurant_token, order_id, "confirmed")
            .await
            .status(),
        StatusCode::OK
    );
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/payment-method"),
            Some(&customer_token),
            Some(json!({ "payment_method": "cash" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    for status in ["preparing", "ready", "out_for_delivery", "delivered"] {
        let response = app.set_status(&restaurant_token, order_id, status).await;
        assert_eq!(response.status(), StatusCode::OK, "moving to {status}");
        assert_eq!(response_json(response).await["data"]["status"], status);
    }

    // Delivered is terminal.
    let response = app.set_status(&restaurant_token, order_id, "cancelled").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn customer_may_cancel_only_while_pending() {
    let app = TestApp::new().await;
    let (_, restaurant_token) = app.restaurant_token();
    let (_, customer_token) = app.customer_token();
    let restaurant_id = app.restaurant_with_credentials(&restaurant_token).await;

    let pending = app.place_order(&customer_token, restaurant_id).await;
    let response = app.set_status(&customer_token, pending, "cancelled").await;
    assert_eq!(response.status(), StatusCode::OK);

    let confirmed = app.place_order(&customer_token, restaurant_id).await;
    app.set_status(&restaurant_token, confirmed, "confirmed").await;
    let response = app.set_status(&customer_token, confirmed, "cancelled").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Customers never confirm their own orders.
    let other = app.place_order(&customer_token, restaurant_id).await;
    let response = app.set_status(&customer_token, other, "confirmed").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn strangers_cannot_see_or_touch_an_order() {
    let app = TestApp::new().await;
    let (_, restaurant_token) = app.restaurant_token();
    let (_, customer_token) = app.customer_token();
    let (_, other_customer) = app.customer_token();
    let (_, other_restaurant) = app.restaurant_token();
    let restaurant_id = app.restaurant_with_credentials(&restaurant_token).await;
    let order_id = app.place_order(&customer_token, restaurant_id).await;

    let uri = format!("/api/v1/orders/{order_id}");
    let response = app
        .request(Method::GET, &uri, Some(&other_customer), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .set_status(&other_restaurant, order_id, "confirmed")
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}/payments"),
            Some(&other_customer),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn listing_returns_only_the_callers_orders() {
    let app = TestApp::new().await;
    let (_, restaurant_token) = app.restaurant_token();
    let (_, customer_token) = app.customer_token();
    let (_, other_customer) = app.customer_token();
    let restaurant_id = app.restaurant_with_credentials(&restaurant_token).await;

    app.place_order(&customer_token, restaurant_id).await;
    app.place_order(&customer_token, restaurant_id).await;
    app.place_order(&other_customer, restaurant_id).await;

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders?per_page=10",
            Some(&customer_token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["orders"].as_array().map(Vec::len), Some(2));

    let response = app
        .request(Method::GET, "/api/v1/orders", Some(&restaurant_token), None)
        .await;
    assert_eq!(response_json(response).await["data"]["total"], 3);
}

#[tokio::test]
async fn payment_settings_never_reveal_the_secret() {
    let app = TestApp::new().await;
    let (_, restaurant_token) = app.restaurant_token();
    let restaurant_id = app.restaurant_with_credentials(&restaurant_token).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/restaurants/{restaurant_id}/payment-settings"),
            Some(&restaurant_token),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"], json!({ "configured": true }));
    assert!(!body.to_string().contains(common::RESTAURANT_SECRET_KEY));

    let (_, other_owner) = app.restaurant_token();
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/restaurants/{restaurant_id}/payment-settings"),
            Some(&other_owner),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_and_request_id_are_served() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let response = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["ready"], true);
}

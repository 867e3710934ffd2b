//! Fixtures shared by the unit tests of the service layer.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::db::{self, DbConfig, DbPool};
use crate::entities::{order, restaurant, restaurant_payment_credentials};
use crate::models::{OrderStatus, OrderType, PaymentMethod};
use crate::payment_provider::{
    CheckoutSession, CheckoutStatus, CreateCheckout, PaymentProvider, PaymentStatus,
    ProviderError,
};

pub async fn setup_db() -> Arc<DbPool> {
    let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
        .await
        .expect("in-memory sqlite");
    db::run_migrations(&pool).await.expect("migrations");
    Arc::new(pool)
}

pub struct Seeded {
    pub customer_id: Uuid,
    pub owner_id: Uuid,
    pub restaurant_id: Uuid,
    pub order_id: Uuid,
}

pub async fn seed_restaurant(db: &DbPool, owner_id: Uuid, secret_key: Option<&str>) -> Uuid {
    let now = Utc::now();
    let restaurant = restaurant::ActiveModel {
        id: Set(Uuid::new_v4()),
        owner_id: Set(owner_id),
        name: Set("Mama's Kitchen".into()),
        created_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert restaurant");

    if let Some(secret_key) = secret_key {
        restaurant_payment_credentials::ActiveModel {
            restaurant_id: Set(restaurant.id),
            secret_key: Set(secret_key.into()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("insert credentials");
    }

    restaurant.id
}

pub async fn seed_order(
    db: &DbPool,
    customer_id: Uuid,
    restaurant_id: Uuid,
    status: OrderStatus,
    total: Decimal,
) -> order::Model {
    let now = Utc::now();
    order::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        restaurant_id: Set(restaurant_id),
        status: Set(status),
        order_type: Set(OrderType::Delivery),
        payment_method: Set(None::<PaymentMethod>),
        payment_confirmed: Set(false),
        total_amount: Set(total),
        currency: Set("ZAR".into()),
        delivery_address: Set(Some("12 Long Street, Cape Town".into())),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .expect("insert order")
}

/// Restaurant with credentials plus one confirmed, unpaid order.
pub async fn seed_confirmed_order(db: &DbPool, total: Decimal) -> Seeded {
    let customer_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();
    let restaurant_id = seed_restaurant(db, owner_id, Some("sk_test_restaurant")).await;
    let order = seed_order(db, customer_id, restaurant_id, OrderStatus::Confirmed, total).await;
    Seeded {
        customer_id,
        owner_id,
        restaurant_id,
        order_id: order.id,
    }
}

/// Scriptable in-process provider.
pub struct FakeProvider {
    pub create_calls: AtomicUsize,
    pub checkout_calls: AtomicUsize,
    pub payment_calls: AtomicUsize,
    pub create_error: Mutex<Option<ProviderError>>,
    pub checkout: Mutex<Result<CheckoutStatus, ProviderError>>,
    pub payment: Mutex<Result<PaymentStatus, ProviderError>>,
    pub last_request: Mutex<Option<CreateCheckout>>,
    /// Added to every status query.
    pub delay: Mutex<Option<Duration>>,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self {
            create_calls: AtomicUsize::new(0),
            checkout_calls: AtomicUsize::new(0),
            payment_calls: AtomicUsize::new(0),
            create_error: Mutex::new(None),
            checkout: Mutex::new(Ok(CheckoutStatus {
                status: "started".into(),
                payment_id: None,
            })),
            payment: Mutex::new(Ok(PaymentStatus {
                status: "pending".into(),
            })),
            last_request: Mutex::new(None),
            delay: Mutex::new(None),
        }
    }
}

impl FakeProvider {
    pub fn set_checkout(&self, status: &str, payment_id: Option<&str>) {
        *self.checkout.lock().unwrap() = Ok(CheckoutStatus {
            status: status.into(),
            payment_id: payment_id.map(Into::into),
        });
    }

    pub fn set_checkout_error(&self, err: ProviderError) {
        *self.checkout.lock().unwrap() = Err(err);
    }

    pub fn set_payment(&self, status: &str) {
        *self.payment.lock().unwrap() = Ok(PaymentStatus {
            status: status.into(),
        });
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn wait(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn fail_create(&self, err: ProviderError) {
        *self.create_error.lock().unwrap() = Some(err);
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_checkout(
        &self,
        _secret_key: &str,
        request: &CreateCheckout,
    ) -> Result<CheckoutSession, ProviderError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_request.lock().unwrap() = Some(request.clone());
        if let Some(err) = self.create_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(CheckoutSession {
            id: format!("ch_{n}_{}", request.attempt_id.simple()),
            redirect_url: format!("https://pay.test/checkout/{n}"),
        })
    }

    async fn get_checkout(
        &self,
        _secret_key: &str,
        _checkout_id: &str,
    ) -> Result<CheckoutStatus, ProviderError> {
        self.checkout_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        self.checkout.lock().unwrap().clone()
    }

    async fn get_payment(
        &self,
        _secret_key: &str,
        _payment_id: &str,
    ) -> Result<PaymentStatus, ProviderError> {
        self.payment_calls.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        self.payment.lock().unwrap().clone()
    }
}

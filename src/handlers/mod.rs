pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod restaurants;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    payment_provider::PaymentProvider,
    services::{
        checkout::CheckoutService, order_status::OrderStatusService, orders::OrderService,
        payment_ledger::PaymentLedger, reconciliation::ReconciliationService,
        restaurants::RestaurantService, webhook::WebhookService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub restaurants: Arc<RestaurantService>,
    pub ledger: Arc<PaymentLedger>,
    pub checkout: Arc<CheckoutService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub webhooks: Arc<WebhookService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                config.default_currency.clone(),
            )),
            order_status: Arc::new(OrderStatusService::new(db_pool.clone())),
            restaurants: Arc::new(RestaurantService::new(db_pool.clone())),
            ledger: Arc::new(PaymentLedger::new(db_pool.clone())),
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                provider.clone(),
                std::time::Duration::from_secs(config.checkout_reuse_window_secs),
            )),
            reconciliation: Arc::new(ReconciliationService::new(
                db_pool.clone(),
                provider,
                config.reconciliation_window(),
                config.reconciliation_interval(),
            )),
            webhooks: Arc::new(WebhookService::new(
                db_pool,
                config.webhook_secret().map(str::to_string),
            )),
        }
    }
}

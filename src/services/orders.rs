use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{order, order_item, restaurant},
    errors::ServiceError,
    metrics::ORDER_METRICS,
    models::{OrderStatus, OrderType, PaymentMethod},
    services::restaurants::RestaurantService,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

const MAX_PER_PAGE: u64 = 100;

/// Largest accepted unit price.
pub const MAX_ITEM_PRICE: Decimal = dec!(1000000.00);

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        return Err(ValidationError::new("price_negative"));
    }
    if *price > MAX_ITEM_PRICE {
        return Err(ValidationError::new("price_too_large"));
    }
    if price.normalize().scale() > 2 {
        return Err(ValidationError::new("price_precision"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemRequest {
    #[validate(length(min = 1, max = 200, message = "item_name is required"))]
    pub item_name: String,
    #[validate(custom = "validate_price")]
    #[schema(value_type = String, example = "75.00")]
    pub price: Decimal,
    #[validate(range(min = 1, max = 100, message = "quantity must be between 1 and 100"))]
    pub quantity: i32,
}

/// Sum of price x quantity over all items, rounded to cents.
fn order_total(items: &[OrderItemRequest]) -> Result<Decimal, ServiceError> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |total, item| {
            item.price
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|line| total.checked_add(line))
        })
        .map(|total| total.round_dp(2))
        .ok_or_else(|| ServiceError::ValidationError("order total is out of range".to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    pub restaurant_id: Uuid,
    pub order_type: OrderType,
    /// Required for delivery orders, ignored for collection.
    #[validate(length(max = 500))]
    pub delivery_address: Option<String>,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub item_name: String,
    #[schema(value_type = String)]
    pub price: Decimal,
    pub quantity: i32,
    #[schema(value_type = String)]
    pub line_total: Decimal,
}

impl From<order_item::Model> for OrderItemResponse {
    fn from(item: order_item::Model) -> Self {
        Self {
            line_total: item.line_total(),
            id: item.id,
            item_name: item.item_name,
            price: item.price,
            quantity: item.quantity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub restaurant_id: Uuid,
    pub status: OrderStatus,
    pub order_type: OrderType,
    pub payment_method: Option<PaymentMethod>,
    pub payment_confirmed: bool,
    #[schema(value_type = String, example = "150.00")]
    pub total_amount: Decimal,
    pub currency: String,
    pub delivery_address: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderResponse {
    pub fn from_parts(order: order::Model, items: Vec<order_item::Model>) -> Self {
        Self {
            id: order.id,
            customer_id: order.customer_id,
            restaurant_id: order.restaurant_id,
            status: order.status,
            order_type: order.order_type,
            payment_method: order.payment_method,
            payment_confirmed: order.payment_confirmed,
            total_amount: order.total_amount,
            currency: order.currency,
            delivery_address: order.delivery_address,
            items: items.into_iter().map(Into::into).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListOrdersQuery {
    /// 1-based page number
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Restaurant users: restrict to one of their restaurants
    pub restaurant_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Loads an order or fails with `OrderNotFound`.
pub async fn load_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    order::Entity::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or(ServiceError::OrderNotFound(order_id))
}

/// Customers may see their own orders, restaurant users the orders placed
/// with a restaurant they own.
pub async fn ensure_order_access<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
    user: &AuthUser,
) -> Result<(), ServiceError> {
    let allowed = if user.is_customer() {
        order.is_owned_by_customer(user.user_id)
    } else {
        restaurant::Entity::find_by_id(order.restaurant_id)
            .one(conn)
            .await?
            .map_or(false, |r| r.owner_id == user.user_id)
    };

    if allowed {
        Ok(())
    } else {
        warn!(order_id = %order.id, user_id = %user.user_id, role = %user.role, "order access denied");
        Err(ServiceError::Forbidden(
            "order belongs to another account".to_string(),
        ))
    }
}

/// Order plus its item snapshot.
pub async fn order_response<C: ConnectionTrait>(
    conn: &C,
    order: order::Model,
) -> Result<OrderResponse, ServiceError> {
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .order_by_asc(order_item::Column::CreatedAt)
        .all(conn)
        .await?;
    Ok(OrderResponse::from_parts(order, items))
}

#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    restaurants: RestaurantService,
    currency: String,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, currency: impl Into<String>) -> Self {
        Self {
            restaurants: RestaurantService::new(db_pool.clone()),
            db_pool,
            currency: currency.into(),
        }
    }

    /// Places an order together with its item snapshot in one transaction.
    #[instrument(skip(self, request), fields(customer_id = %customer_id, restaurant_id = %request.restaurant_id))]
    pub async fn create_order(
        &self,
        customer_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        request.validate()?;
        if request.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "an order needs at least one item".to_string(),
            ));
        }
        for item in &request.items {
            item.validate()?;
        }

        let delivery_address = match request.order_type {
            OrderType::Delivery => {
                let address = request
                    .delivery_address
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        ServiceError::ValidationError(
                            "delivery_address is required for delivery orders".to_string(),
                        )
                    })?;
                Some(address.to_string())
            }
            OrderType::Collection => None,
        };

        let total = order_total(&request.items)?;

        let db = &*self.db_pool;
        let txn = db.begin().await?;

        restaurant::Entity::find_by_id(request.restaurant_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Restaurant {} not found", request.restaurant_id))
            })?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order = order::ActiveModel {
            id: Set(order_id),
            customer_id: Set(customer_id),
            restaurant_id: Set(request.restaurant_id),
            status: Set(OrderStatus::Pending),
            order_type: Set(request.order_type),
            payment_method: Set(None),
            payment_confirmed: Set(false),
            total_amount: Set(total),
            currency: Set(self.currency.clone()),
            delivery_address: Set(delivery_address),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for item in request.items {
            let saved = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                item_name: Set(item.item_name.trim().to_string()),
                price: Set(item.price),
                quantity: Set(item.quantity),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(saved);
        }

        txn.commit().await?;

        ORDER_METRICS.orders_created.inc();
        info!(order_id = %order_id, total = %total, "order created");
        Ok(OrderResponse::from_parts(order, items))
    }

    #[instrument(skip(self, user), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid, user: &AuthUser) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let order = load_order(db, order_id).await?;
        ensure_order_access(db, &order, user).await?;
        order_response(db, order).await
    }

    /// Newest first. Customers see their own orders; restaurant users see
    /// the orders of the restaurants they own.
    #[instrument(skip(self, user, query))]
    pub async fn list_orders(
        &self,
        user: &AuthUser,
        query: ListOrdersQuery,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query.per_page.unwrap_or(20).clamp(1, MAX_PER_PAGE);

        let mut select = order::Entity::find();
        if user.is_customer() {
            select = select.filter(order::Column::CustomerId.eq(user.user_id));
            if let Some(restaurant_id) = query.restaurant_id {
                select = select.filter(order::Column::RestaurantId.eq(restaurant_id));
            }
        } else {
            let restaurant_ids = match query.restaurant_id {
                Some(restaurant_id) => {
                    self.restaurants.owned_by(restaurant_id, user.user_id).await?;
                    vec![restaurant_id]
                }
                None => self.restaurants.ids_owned_by(user.user_id).await?,
            };
            if restaurant_ids.is_empty() {
                return Ok(OrderListResponse {
                    orders: Vec::new(),
                    total: 0,
                    page,
                    per_page,
                });
            }
            select = select.filter(order::Column::RestaurantId.is_in(restaurant_ids));
        }

        let db = &*self.db_pool;
        let paginator = select
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        if !ids.is_empty() {
            for item in order_item::Entity::find()
                .filter(order_item::Column::OrderId.is_in(ids))
                .order_by_asc(order_item::Column::CreatedAt)
                .all(db)
                .await?
            {
                items_by_order.entry(item.order_id).or_default().push(item);
            }
        }

        let orders = orders
            .into_iter()
            .map(|o| {
                let items = items_by_order.remove(&o.id).unwrap_or_default();
                OrderResponse::from_parts(o, items)
            })
            .collect();

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }
}

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QuerySelect,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::{restaurant, restaurant_payment_credentials},
    errors::ServiceError,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRestaurantRequest {
    #[validate(length(min = 1, max = 120, message = "Restaurant name is required"))]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RestaurantResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<restaurant::Model> for RestaurantResponse {
    fn from(model: restaurant::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            name: model.name,
            created_at: model.created_at,
        }
    }
}

#[derive(Deserialize, Validate, ToSchema)]
pub struct PaymentCredentialsRequest {
    /// Secret key issued to the restaurant by the payment provider.
    #[validate(length(min = 8, max = 256, message = "secret_key must be 8-256 characters"))]
    pub secret_key: String,
}

impl std::fmt::Debug for PaymentCredentialsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentCredentialsRequest")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// The only view of a restaurant's payment credentials ever returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaymentSettingsResponse {
    pub configured: bool,
}

#[derive(Clone)]
pub struct RestaurantService {
    db: Arc<DbPool>,
}

impl RestaurantService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(owner_id = %owner_id))]
    pub async fn register(
        &self,
        owner_id: Uuid,
        request: RegisterRestaurantRequest,
    ) -> Result<RestaurantResponse, ServiceError> {
        request.validate()?;

        let model = restaurant::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(owner_id),
            name: Set(request.name.trim().to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        info!(restaurant_id = %model.id, "restaurant registered");
        Ok(model.into())
    }

    /// Loads a restaurant and checks that `owner_id` owns it.
    pub async fn owned_by(
        &self,
        restaurant_id: Uuid,
        owner_id: Uuid,
    ) -> Result<restaurant::Model, ServiceError> {
        let restaurant = restaurant::Entity::find_by_id(restaurant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Restaurant {} not found", restaurant_id)))?;

        if restaurant.owner_id != owner_id {
            warn!(%restaurant_id, %owner_id, "restaurant access denied");
            return Err(ServiceError::Forbidden(
                "restaurant belongs to another owner".to_string(),
            ));
        }
        Ok(restaurant)
    }

    pub async fn ids_owned_by(&self, owner_id: Uuid) -> Result<Vec<Uuid>, ServiceError> {
        Ok(restaurant::Entity::find()
            .select_only()
            .column(restaurant::Column::Id)
            .filter(restaurant::Column::OwnerId.eq(owner_id))
            .into_tuple::<Uuid>()
            .all(&*self.db)
            .await?)
    }

    /// Stores or replaces the restaurant's provider secret key.
    #[instrument(skip(self, request), fields(restaurant_id = %restaurant_id))]
    pub async fn put_credentials(
        &self,
        restaurant_id: Uuid,
        owner_id: Uuid,
        request: PaymentCredentialsRequest,
    ) -> Result<PaymentSettingsResponse, ServiceError> {
        request.validate()?;
        let secret_key = request.secret_key.trim();
        if secret_key.is_empty() {
            return Err(ServiceError::ValidationError(
                "secret_key must not be blank".to_string(),
            ));
        }
        self.owned_by(restaurant_id, owner_id).await?;

        let now = Utc::now();
        restaurant_payment_credentials::Entity::insert(restaurant_payment_credentials::ActiveModel {
            restaurant_id: Set(restaurant_id),
            secret_key: Set(secret_key.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::column(restaurant_payment_credentials::Column::RestaurantId)
                .update_columns([
                    restaurant_payment_credentials::Column::SecretKey,
                    restaurant_payment_credentials::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(&*self.db)
        .await?;

        info!("payment credentials configured");
        Ok(PaymentSettingsResponse { configured: true })
    }

    pub async fn payment_settings(
        &self,
        restaurant_id: Uuid,
        owner_id: Uuid,
    ) -> Result<PaymentSettingsResponse, ServiceError> {
        self.owned_by(restaurant_id, owner_id).await?;
        let configured = self.credentials_for(restaurant_id).await?.is_some();
        Ok(PaymentSettingsResponse { configured })
    }

    /// Secret key used to call the provider for this restaurant.
    pub async fn credentials_for(&self, restaurant_id: Uuid) -> Result<Option<String>, ServiceError> {
        Ok(
            restaurant_payment_credentials::Entity::find_by_id(restaurant_id)
                .one(&*self.db)
                .await?
                .map(|c| c.secret_key)
                .filter(|key| !key.trim().is_empty()),
        )
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Optional restriction of a voucher to category and/or product sets.
/// Empty sets mean no restriction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, Default)]
pub struct VoucherScope {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

impl VoucherScope {
    pub fn is_unrestricted(&self) -> bool {
        self.categories.is_empty() && self.product_ids.is_empty()
    }
}

/// A discount rule. `used_count` only moves through atomic conditional
/// updates so the limit holds under concurrent checkouts.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vouchers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    /// `percent` or `fixed`
    pub discount_type: String,
    pub discount_value: Decimal,
    pub usage_limit: i32,
    pub used_count: i32,
    pub min_order_value: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    #[sea_orm(column_type = "Json")]
    pub scope: VoucherScope,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {}

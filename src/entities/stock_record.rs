use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authoritative current-quantity row for one product at one branch.
///
/// At most one record exists per (product_id, branch_id); the pair is
/// enforced by a unique index. A record belongs exclusively to its
/// branch and is never hard-deleted in normal operation.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub current_stock: i32,
    pub damaged_stock: i32,
    pub min_stock_level: i32,
    pub max_stock_level: i32,
    pub created_by: Uuid,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_movement::Entity")]
    StockMovement,
}

impl Related<super::stock_movement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockMovement.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// True when the row can satisfy a debit of `quantity` units.
    pub fn has_sufficient(&self, quantity: i32) -> bool {
        self.current_stock >= quantity
    }

    /// True when current stock has fallen to or below the minimum level.
    pub fn is_below_minimum(&self) -> bool {
        self.current_stock <= self.min_stock_level
    }
}

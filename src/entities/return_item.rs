use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a customer or branch is returning an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    Damaged,
    WrongItem,
    Expired,
    CustomerRequest,
    Other,
}

impl ReturnReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnReason::Damaged => "damaged",
            ReturnReason::WrongItem => "wrong_item",
            ReturnReason::Expired => "expired",
            ReturnReason::CustomerRequest => "customer_request",
            ReturnReason::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "damaged" => Some(ReturnReason::Damaged),
            "wrong_item" => Some(ReturnReason::WrongItem),
            "expired" => Some(ReturnReason::Expired),
            "customer_request" => Some(ReturnReason::CustomerRequest),
            "other" => Some(ReturnReason::Other),
            _ => None,
        }
    }
}

/// Per-item decision state; set consistently with the overall decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnItemStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReturnItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnItemStatus::Pending => "pending",
            ReturnItemStatus::Approved => "approved",
            ReturnItemStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReturnItemStatus::Pending),
            "approved" => Some(ReturnItemStatus::Approved),
            "rejected" => Some(ReturnItemStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "return_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub return_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    pub reason: String,
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::return_entity::Entity",
        from = "Column::ReturnId",
        to = "super::return_entity::Column::Id"
    )]
    Return,
}

impl Related<super::return_entity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Return.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of one embedded stock movement.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
        }
    }
}

/// One quantity change on a stock record, in insertion order.
///
/// This is the record's embedded movement log; the independent audit
/// ledger lives in `stock_history`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stock_record_id: Uuid,
    pub movement_type: String,
    pub quantity: i32,
    pub reference: String,
    pub actor: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::stock_record::Entity",
        from = "Column::StockRecordId",
        to = "super::stock_record::Column::Id"
    )]
    StockRecord,
}

impl Related<super::stock_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockRecord.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

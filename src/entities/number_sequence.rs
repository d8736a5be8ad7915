use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Atomic per-(prefix, day) counter backing human-readable document
/// numbers such as `SALE-20260215-7`. Incremented with a guarded UPDATE
/// inside the caller's transaction, never derived from a row count.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "number_sequences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub prefix: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub day: String,
    pub counter: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of quantity-changing (or workflow) event recorded in the ledger.
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
pub enum HistoryAction {
    Delivery,
    ReturnPending,
    ReturnRejected,
    ReturnApproved,
    Sale,
    SaleCancelled,
    SaleDeleted,
    Restock,
    Adjustment,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Delivery => "delivery",
            HistoryAction::ReturnPending => "return_pending",
            HistoryAction::ReturnRejected => "return_rejected",
            HistoryAction::ReturnApproved => "return_approved",
            HistoryAction::Sale => "sale",
            HistoryAction::SaleCancelled => "sale_cancelled",
            HistoryAction::SaleDeleted => "sale_deleted",
            HistoryAction::Restock => "restock",
            HistoryAction::Adjustment => "adjustment",
        }
    }
}

/// Append-only audit record of a stock event, decoupled from the stock
/// record's own embedded log. Rows are created once and never mutated or
/// deleted; the engine exposes no update surface for this table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub action: String,
    /// Signed quantity delta; zero for workflow-only transitions.
    pub quantity: i32,
    pub reference: String,
    pub actor: Uuid,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn action_round_trips_through_strings() {
        for action in [
            HistoryAction::Delivery,
            HistoryAction::ReturnPending,
            HistoryAction::ReturnRejected,
            HistoryAction::ReturnApproved,
            HistoryAction::Sale,
            HistoryAction::SaleCancelled,
            HistoryAction::SaleDeleted,
            HistoryAction::Restock,
            HistoryAction::Adjustment,
        ] {
            assert_eq!(
                HistoryAction::from_str(action.as_str()).unwrap(),
                action
            );
            assert_eq!(action.to_string(), action.as_str());
        }
    }
}

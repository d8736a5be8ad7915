use crate::{
    auth::Actor,
    commands::Command,
    db::DbPool,
    entities::{stock_history::HistoryAction, stock_record},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::{self, StockChange},
};
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Moves units out of the sellable balance into the damaged balance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MarkStockDamagedCommand {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub notes: Option<String>,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for MarkStockDamagedCommand {
    type Result = stock_record::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(product_id = %self.product_id, branch_id = %self.branch_id, quantity = self.quantity))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        self.actor.ensure_branch(self.branch_id)?;

        let db = db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let record = stock::mark_damaged(
            &txn,
            &StockChange {
                product_id: self.product_id,
                branch_id: self.branch_id,
                delta: -self.quantity,
                action: HistoryAction::Adjustment,
                reference: "damaged write-off".to_string(),
                actor: self.actor.id,
                notes: self.notes.clone(),
            },
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            product_id = %self.product_id,
            damaged_stock = record.damaged_stock,
            "Stock marked damaged"
        );

        event_sender
            .send_all(vec![Event::stock_changed(
                self.branch_id,
                self.product_id,
                record.current_stock,
                HistoryAction::Adjustment.as_str(),
            )])
            .await;

        Ok(record)
    }
}

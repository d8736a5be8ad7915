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

/// Manual stock correction, positive or negative.
///
/// A debit that would drive the balance negative fails with
/// `InsufficientStock` and leaves nothing behind.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdjustStockCommand {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    pub delta: i32,
    #[validate(length(min = 1, message = "Adjustment reason is required"))]
    pub reason: String,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for AdjustStockCommand {
    type Result = stock_record::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(product_id = %self.product_id, branch_id = %self.branch_id, delta = self.delta))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        if self.delta == 0 {
            return Err(ServiceError::ValidationError(
                "adjustment delta must be non-zero".into(),
            ));
        }
        self.actor.ensure_branch(self.branch_id)?;

        let db = db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let record = stock::apply_change(
            &txn,
            &StockChange {
                product_id: self.product_id,
                branch_id: self.branch_id,
                delta: self.delta,
                action: HistoryAction::Adjustment,
                reference: self.reason.clone(),
                actor: self.actor.id,
                notes: None,
            },
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            product_id = %self.product_id,
            branch_id = %self.branch_id,
            delta = self.delta,
            new_quantity = record.current_stock,
            "Stock adjusted"
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

use crate::{
    auth::Actor,
    commands::Command,
    db::DbPool,
    entities::{stock_history::HistoryAction, stock_record},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock,
};
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateStockRecordCommand {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    #[validate(range(min = 0))]
    pub initial_stock: i32,
    #[validate(range(min = 0))]
    pub min_stock_level: i32,
    #[validate(range(min = 0))]
    pub max_stock_level: i32,
    pub reference: Option<String>,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for CreateStockRecordCommand {
    type Result = stock_record::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(product_id = %self.product_id, branch_id = %self.branch_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        self.actor.ensure_branch(self.branch_id)?;

        let db = db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let reference = self
            .reference
            .clone()
            .unwrap_or_else(|| "initial inventory entry".to_string());

        let record = stock::create_record(
            &txn,
            self.product_id,
            self.branch_id,
            self.initial_stock,
            self.min_stock_level,
            self.max_stock_level,
            &reference,
            self.actor.id,
        )
        .await?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            product_id = %self.product_id,
            branch_id = %self.branch_id,
            initial_stock = self.initial_stock,
            "Stock record created"
        );

        if self.initial_stock > 0 {
            event_sender
                .send_all(vec![Event::stock_changed(
                    self.branch_id,
                    self.product_id,
                    record.current_stock,
                    HistoryAction::Delivery.as_str(),
                )])
                .await;
        }

        Ok(record)
    }
}

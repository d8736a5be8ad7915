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
pub struct BulkStockEntry {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    #[validate(range(min = 0))]
    pub initial_stock: i32,
    #[validate(range(min = 0))]
    pub min_stock_level: i32,
    #[validate(range(min = 0))]
    pub max_stock_level: i32,
}

/// Creates many stock records in one unit of work.
///
/// A duplicate pair or invalid entry anywhere in the batch aborts the
/// whole batch; there is no partial creation.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkCreateStockCommand {
    #[validate(length(min = 1, message = "At least one entry is required"))]
    pub entries: Vec<BulkStockEntry>,
    pub reference: Option<String>,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for BulkCreateStockCommand {
    type Result = Vec<stock_record::Model>;

    #[instrument(skip(self, db_pool, event_sender), fields(entry_count = self.entries.len()))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        for entry in &self.entries {
            entry.validate()?;
            self.actor.ensure_branch(entry.branch_id)?;
        }

        let db = db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let reference = self
            .reference
            .clone()
            .unwrap_or_else(|| "bulk inventory entry".to_string());

        let mut records = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let record = stock::create_record(
                &txn,
                entry.product_id,
                entry.branch_id,
                entry.initial_stock,
                entry.min_stock_level,
                entry.max_stock_level,
                &reference,
                self.actor.id,
            )
            .await?;
            records.push(record);
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(created = records.len(), "Bulk stock records created");

        let events: Vec<Event> = records
            .iter()
            .filter(|r| r.current_stock > 0)
            .map(|r| {
                Event::stock_changed(
                    r.branch_id,
                    r.product_id,
                    r.current_stock,
                    HistoryAction::Delivery.as_str(),
                )
            })
            .collect();
        event_sender.send_all(events).await;

        Ok(records)
    }
}

use crate::{
    auth::Actor,
    commands::Command,
    db::DbPool,
    entities::stock_record,
    errors::ServiceError,
    events::EventSender,
    services::stock,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Updates the min/max stock levels for one record.
///
/// Rejected with a validation failure when max < min; the prior limits
/// stay in place. No quantity changes, so no movement or ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetStockLimitsCommand {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    #[validate(range(min = 0))]
    pub min_stock_level: i32,
    #[validate(range(min = 0))]
    pub max_stock_level: i32,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for SetStockLimitsCommand {
    type Result = stock_record::Model;

    #[instrument(skip(self, db_pool, _event_sender), fields(product_id = %self.product_id, branch_id = %self.branch_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        _event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        self.actor.ensure_branch(self.branch_id)?;

        let db = db_pool.as_ref();
        let record = stock::set_limits(
            db,
            self.product_id,
            self.branch_id,
            self.min_stock_level,
            self.max_stock_level,
            self.actor.id,
        )
        .await?;

        info!(
            product_id = %self.product_id,
            branch_id = %self.branch_id,
            min = self.min_stock_level,
            max = self.max_stock_level,
            "Stock limits updated"
        );

        Ok(record)
    }
}

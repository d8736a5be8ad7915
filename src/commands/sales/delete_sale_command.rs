use crate::{
    auth::Actor,
    commands::{sales::apply_item_changes, Command},
    db::DbPool,
    entities::{
        sale::{Entity as Sale, SaleStatus},
        sale_item::{self, Entity as SaleItem},
        stock_history::HistoryAction,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Deletes a sale, first reversing any stock debit it applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSaleCommand {
    pub sale_id: Uuid,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for DeleteSaleCommand {
    type Result = ();

    #[instrument(skip(self, db_pool, event_sender), fields(sale_id = %self.sale_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let db = db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let sale_model = Sale::find_by_id(self.sale_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("sale {} not found", self.sale_id)))?;

        self.actor.ensure_branch(sale_model.branch_id)?;

        let branch_id = sale_model.branch_id;
        let sale_number = sale_model.sale_number.clone();
        let was_completed = sale_model.status() == Some(SaleStatus::Completed);

        let item_models = SaleItem::find()
            .filter(sale_item::Column::SaleId.eq(self.sale_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        // A completed sale gave stock away; put it back before the
        // document disappears. Non-completed sales never touched stock.
        let touched = if was_completed {
            let lines: Vec<(Uuid, i32)> = item_models
                .iter()
                .map(|i| (i.product_id, i.quantity))
                .collect();
            apply_item_changes(
                &txn,
                branch_id,
                &lines,
                1,
                HistoryAction::SaleDeleted,
                &sale_number,
                self.actor.id,
            )
            .await?
        } else {
            Vec::new()
        };

        SaleItem::delete_many()
            .filter(sale_item::Column::SaleId.eq(self.sale_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        sale_model
            .delete(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            sale_id = %self.sale_id,
            sale_number = %sale_number,
            was_completed,
            "Sale deleted"
        );

        let mut events = vec![Event::SaleDeleted {
            event_id: Uuid::new_v4(),
            sale_id: self.sale_id,
            branch_id,
        }];
        events.extend(touched.into_iter().map(|(product_id, new_quantity)| {
            Event::stock_changed(
                branch_id,
                product_id,
                new_quantity,
                HistoryAction::SaleDeleted.as_str(),
            )
        }));
        event_sender.send_all(events).await;

        Ok(())
    }
}

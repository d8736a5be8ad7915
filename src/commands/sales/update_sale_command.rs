use crate::{
    auth::Actor,
    commands::{
        sales::{apply_item_changes, ensure_sufficient, total_amount, SaleItemInput, SaleWithItems},
        Command,
    },
    db::DbPool,
    entities::{
        sale::{self, Entity as Sale, SaleStatus},
        sale_item::{self, Entity as SaleItem},
        stock_history::HistoryAction,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Updates a sale's item list and/or status.
///
/// Only the `completed` status carries a stock effect, so the stock
/// ledger is touched exactly when a transition crosses into or out of
/// completed. Item replacement is allowed only while the sale is not
/// completed, keeping every debit attributable to one transition.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateSaleCommand {
    pub sale_id: Uuid,
    pub status: Option<SaleStatus>,
    pub items: Option<Vec<SaleItemInput>>,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for UpdateSaleCommand {
    type Result = SaleWithItems;

    #[instrument(skip(self, db_pool, event_sender), fields(sale_id = %self.sale_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        if let Some(items) = &self.items {
            if items.is_empty() {
                return Err(ServiceError::ValidationError(
                    "a sale needs at least one item".into(),
                ));
            }
            for item in items {
                item.check()?;
            }
        }

        let db = db_pool.as_ref();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let sale_model = Sale::find_by_id(self.sale_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("sale {} not found", self.sale_id)))?;

        self.actor.ensure_branch(sale_model.branch_id)?;

        let current_status = sale_model.status().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "sale {} has unknown status {}",
                self.sale_id, sale_model.status
            ))
        })?;
        let branch_id = sale_model.branch_id;
        let sale_number = sale_model.sale_number.clone();

        // Replace the item list first; a later transition in the same
        // call debits against the replacement.
        let mut items_changed = false;
        if let Some(new_items) = &self.items {
            if current_status == SaleStatus::Completed {
                return Err(ServiceError::ValidationError(
                    "cannot replace items on a completed sale; move it to pending first".into(),
                ));
            }
            SaleItem::delete_many()
                .filter(sale_item::Column::SaleId.eq(self.sale_id))
                .exec(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
            for item in new_items {
                let model = sale_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    sale_id: Set(self.sale_id),
                    product_id: Set(item.product_id),
                    quantity: Set(item.quantity),
                    unit_price: Set(item.unit_price),
                };
                model
                    .insert(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?;
            }
            items_changed = true;
        }

        let item_models = SaleItem::find()
            .filter(sale_item::Column::SaleId.eq(self.sale_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;
        let lines: Vec<(Uuid, i32)> = item_models
            .iter()
            .map(|i| (i.product_id, i.quantity))
            .collect();

        let new_status = self.status.unwrap_or(current_status);
        let mut touched = Vec::new();

        if new_status != current_status {
            match (current_status, new_status) {
                (SaleStatus::Completed, _) => {
                    // Leaving completed credits every line back.
                    touched = apply_item_changes(
                        &txn,
                        branch_id,
                        &lines,
                        1,
                        HistoryAction::SaleCancelled,
                        &sale_number,
                        self.actor.id,
                    )
                    .await?;
                }
                (_, SaleStatus::Completed) => {
                    ensure_sufficient(&txn, branch_id, &lines).await?;
                    touched = apply_item_changes(
                        &txn,
                        branch_id,
                        &lines,
                        -1,
                        HistoryAction::Sale,
                        &sale_number,
                        self.actor.id,
                    )
                    .await?;
                }
                _ => {
                    // pending <-> cancelled: no stock effect.
                }
            }
        }

        let mut active: sale::ActiveModel = sale_model.into();
        active.status = Set(new_status.as_str().to_string());
        if let Some(new_items) = &self.items {
            active.total_amount = Set(total_amount(new_items));
        }
        active.updated_at = Set(Utc::now());
        let updated_sale = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            sale_id = %self.sale_id,
            old_status = current_status.as_str(),
            new_status = new_status.as_str(),
            items_changed,
            "Sale updated"
        );

        let change_type = if new_status == SaleStatus::Completed {
            HistoryAction::Sale
        } else {
            HistoryAction::SaleCancelled
        };
        let mut events = vec![Event::SaleUpdated {
            event_id: Uuid::new_v4(),
            sale_id: self.sale_id,
            branch_id,
            status: new_status.as_str().to_string(),
        }];
        events.extend(touched.into_iter().map(|(product_id, new_quantity)| {
            Event::stock_changed(branch_id, product_id, new_quantity, change_type.as_str())
        }));
        event_sender.send_all(events).await;

        Ok(SaleWithItems {
            sale: updated_sale,
            items: item_models,
        })
    }
}

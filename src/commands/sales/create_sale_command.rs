use crate::{
    auth::Actor,
    commands::{
        sales::{apply_item_changes, ensure_sufficient, total_amount, SaleItemInput, SaleWithItems},
        Command,
    },
    db::DbPool,
    entities::{
        sale::{self, PaymentMethod, SaleStatus},
        sale_item,
        stock_history::HistoryAction,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::sequences,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Creates a point-of-sale transaction.
///
/// Stock sufficiency is checked for every line before the first debit;
/// a shortfall on any line aborts the whole unit with no sale document
/// and no stock change.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSaleCommand {
    pub branch_id: Uuid,
    #[validate(length(min = 1, message = "A sale needs at least one item"))]
    pub items: Vec<SaleItemInput>,
    pub payment_method: PaymentMethod,
    /// Defaults to completed (point-of-sale semantics); `pending` defers
    /// the stock debit to the later transition.
    pub status: Option<SaleStatus>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for CreateSaleCommand {
    type Result = SaleWithItems;

    #[instrument(skip(self, db_pool, event_sender), fields(branch_id = %self.branch_id, item_count = self.items.len()))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        for item in &self.items {
            item.check()?;
        }
        let status = self.status.unwrap_or(SaleStatus::Completed);
        if status == SaleStatus::Cancelled {
            return Err(ServiceError::ValidationError(
                "a sale cannot be created as cancelled".into(),
            ));
        }
        self.actor.ensure_branch(self.branch_id)?;

        let db = db_pool.as_ref();
        let now = Utc::now();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let sale_number = sequences::next_number(&txn, "SALE", now.date_naive()).await?;
        let lines: Vec<(Uuid, i32)> = self
            .items
            .iter()
            .map(|i| (i.product_id, i.quantity))
            .collect();

        // All lines are checked before anything is written.
        if status == SaleStatus::Completed {
            ensure_sufficient(&txn, self.branch_id, &lines).await?;
        }

        let sale_id = Uuid::new_v4();
        let sale_model = sale::ActiveModel {
            id: Set(sale_id),
            sale_number: Set(sale_number.clone()),
            branch_id: Set(self.branch_id),
            status: Set(status.as_str().to_string()),
            payment_method: Set(self.payment_method.as_str().to_string()),
            total_amount: Set(total_amount(&self.items)),
            customer_name: Set(self.customer_name.clone()),
            customer_phone: Set(self.customer_phone.clone()),
            created_by: Set(self.actor.id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let sale_model = sale_model
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut item_models = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let model = sale_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                sale_id: Set(sale_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
            };
            item_models.push(
                model
                    .insert(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?,
            );
        }

        let touched = if status == SaleStatus::Completed {
            apply_item_changes(
                &txn,
                self.branch_id,
                &lines,
                -1,
                HistoryAction::Sale,
                &sale_number,
                self.actor.id,
            )
            .await?
        } else {
            Vec::new()
        };

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            sale_id = %sale_id,
            sale_number = %sale_number,
            status = status.as_str(),
            "Sale created"
        );

        let mut events = vec![Event::SaleCreated {
            event_id: Uuid::new_v4(),
            sale_id,
            branch_id: self.branch_id,
            sale_number,
            total_amount: sale_model.total_amount,
        }];
        events.extend(touched.into_iter().map(|(product_id, new_quantity)| {
            Event::stock_changed(
                self.branch_id,
                product_id,
                new_quantity,
                HistoryAction::Sale.as_str(),
            )
        }));
        event_sender.send_all(events).await;

        Ok(SaleWithItems {
            sale: sale_model,
            items: item_models,
        })
    }
}

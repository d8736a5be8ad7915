use crate::{
    auth::Actor,
    commands::{
        returns::{ReturnItemInput, ReturnWithItems, RETURN_WINDOW_DAYS},
        Command,
    },
    db::DbPool,
    entities::{
        order::{Entity as Order, OrderStatus},
        order_item::{self, Entity as OrderItem},
        return_entity::{self, ReturnKind, ReturnStatus},
        return_item::{self, ReturnItemStatus},
        return_status_history,
        stock_history::HistoryAction,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        sequences,
        stock::{self, StockChange},
    },
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Opens a return request in the pending-approval state.
///
/// The delivery kind returns goods from a recently delivered order back
/// toward the supplier: the order must be delivered, no older than the
/// return window, and every line must match an order line; stock leaves
/// the branch immediately. The restock kind is branch-initiated and has
/// no stock effect until approval.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReturnCommand {
    pub kind: ReturnKind,
    pub order_id: Option<Uuid>,
    pub sale_id: Option<Uuid>,
    pub branch_id: Uuid,
    #[validate(length(min = 1, message = "A return needs at least one item"))]
    pub items: Vec<ReturnItemInput>,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for CreateReturnCommand {
    type Result = ReturnWithItems;

    #[instrument(skip(self, db_pool, event_sender), fields(branch_id = %self.branch_id, kind = self.kind.as_str(), item_count = self.items.len()))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        for item in &self.items {
            item.validate()?;
            if item.price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "price for product {} must not be negative",
                    item.product_id
                )));
            }
        }
        if self.kind == ReturnKind::Delivery && self.order_id.is_none() {
            return Err(ServiceError::ValidationError(
                "a delivery return must reference its originating order".into(),
            ));
        }
        self.actor.ensure_branch(self.branch_id)?;

        let db = db_pool.as_ref();
        let now = Utc::now();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let return_number = sequences::next_number(&txn, "RET", now.date_naive()).await?;

        let touched = match self.kind {
            ReturnKind::Delivery => {
                self.check_delivery_gate(&txn).await?;
                // Goods leave the branch toward the supplier now; the
                // ledger carries the debit under return_pending.
                let mut touched = Vec::with_capacity(self.items.len());
                for item in &self.items {
                    let record = stock::apply_change(
                        &txn,
                        &StockChange {
                            product_id: item.product_id,
                            branch_id: self.branch_id,
                            delta: -item.quantity,
                            action: HistoryAction::ReturnPending,
                            reference: return_number.clone(),
                            actor: self.actor.id,
                            notes: Some("returned to supplier".to_string()),
                        },
                    )
                    .await?;
                    touched.push((item.product_id, record.current_stock));
                }
                touched
            }
            ReturnKind::Restock => {
                // No stock effect at creation; the record must still
                // exist, and the workflow event still reaches the ledger.
                for item in &self.items {
                    stock::require_stock(&txn, item.product_id, self.branch_id).await?;
                    stock::record_workflow_entry(
                        &txn,
                        item.product_id,
                        self.branch_id,
                        HistoryAction::ReturnPending,
                        &return_number,
                        self.actor.id,
                        None,
                    )
                    .await?;
                }
                Vec::new()
            }
        };

        let return_id = Uuid::new_v4();
        let return_model = return_entity::ActiveModel {
            id: Set(return_id),
            return_number: Set(return_number.clone()),
            source_kind: Set(self.kind.as_str().to_string()),
            order_id: Set(self.order_id),
            sale_id: Set(self.sale_id),
            branch_id: Set(self.branch_id),
            status: Set(ReturnStatus::PendingApproval.as_str().to_string()),
            created_by: Set(self.actor.id),
            reviewed_by: Set(None),
            review_notes: Set(None),
            reviewed_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let return_model = return_model
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut item_models = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let model = return_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                return_id: Set(return_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                price: Set(item.price),
                reason: Set(item.reason.as_str().to_string()),
                status: Set(ReturnItemStatus::Pending.as_str().to_string()),
            };
            item_models.push(
                model
                    .insert(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?,
            );
        }

        let history_row = return_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            return_id: Set(return_id),
            status: Set(ReturnStatus::PendingApproval.as_str().to_string()),
            changed_by: Set(self.actor.id),
            note: Set(None),
            created_at: Set(now),
        };
        history_row
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            return_id = %return_id,
            return_number = %return_number,
            kind = self.kind.as_str(),
            "Return created"
        );

        let mut events = vec![Event::ReturnCreated {
            event_id: Uuid::new_v4(),
            return_id,
            branch_id: self.branch_id,
            return_number,
        }];
        events.extend(touched.into_iter().map(|(product_id, new_quantity)| {
            Event::stock_changed(
                self.branch_id,
                product_id,
                new_quantity,
                HistoryAction::ReturnPending.as_str(),
            )
        }));
        event_sender.send_all(events).await;

        Ok(ReturnWithItems {
            return_request: return_model,
            items: item_models,
        })
    }
}

impl CreateReturnCommand {
    /// Delivery-kind gate: the order exists in this branch, is
    /// delivered, is inside the return window, and covers every line.
    async fn check_delivery_gate(
        &self,
        txn: &sea_orm::DatabaseTransaction,
    ) -> Result<(), ServiceError> {
        let order_id = self.order_id.ok_or_else(|| {
            ServiceError::ValidationError(
                "a delivery return must reference its originating order".into(),
            )
        })?;

        let order = Order::find_by_id(order_id)
            .one(txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        if order.branch_id != self.branch_id {
            return Err(ServiceError::ValidationError(format!(
                "order {} belongs to a different branch",
                order.order_number
            )));
        }
        if order.status() != Some(OrderStatus::Delivered) {
            return Err(ServiceError::ValidationError(format!(
                "order {} is not delivered",
                order.order_number
            )));
        }
        let delivered_at = order.delivered_at.ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "order {} has no delivery timestamp",
                order.order_number
            ))
        })?;
        if Utc::now() - delivered_at > Duration::days(RETURN_WINDOW_DAYS) {
            return Err(ServiceError::ValidationError(format!(
                "order {} was delivered more than {} days ago",
                order.order_number, RETURN_WINDOW_DAYS
            )));
        }

        let order_items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        for item in &self.items {
            let line = order_items
                .iter()
                .find(|l| l.product_id == item.product_id)
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "product {} is not part of order {}",
                        item.product_id, order.order_number
                    ))
                })?;
            if line.quantity < item.quantity {
                return Err(ServiceError::ValidationError(format!(
                    "return quantity {} for product {} exceeds ordered quantity {}",
                    item.quantity, item.product_id, line.quantity
                )));
            }
        }

        Ok(())
    }
}

use crate::{
    auth::Actor,
    commands::{returns::ReturnWithItems, Command},
    db::DbPool,
    entities::{
        order::{self, Entity as Order},
        order_item::{self, Entity as OrderItem},
        return_entity::{self, Entity as Return, ReturnKind, ReturnStatus},
        return_item::{self, Entity as ReturnItem, ReturnItemStatus},
        return_status_history,
        stock_history::HistoryAction,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock::{self, StockChange},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Reject => "reject",
        }
    }
}

/// Per-item verdict inside an approval. Must reference an existing
/// return line with a matching quantity.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReturnItemDecision {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub approve: bool,
}

/// Reviews a pending return, exactly once, into a terminal state.
///
/// Validation runs in full before any mutation: pending status, branch
/// scope, and every supplied item decision matching a return line. A
/// mismatch aborts the whole review with no partial item updates.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReviewReturnCommand {
    pub return_id: Uuid,
    pub decision: ReviewDecision,
    pub item_decisions: Vec<ReturnItemDecision>,
    pub notes: Option<String>,
    pub actor: Actor,
}

#[async_trait::async_trait]
impl Command for ReviewReturnCommand {
    type Result = ReturnWithItems;

    #[instrument(skip(self, db_pool, event_sender), fields(return_id = %self.return_id, decision = self.decision.as_str()))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        for decision in &self.item_decisions {
            decision.validate()?;
        }

        let db = db_pool.as_ref();
        let now = Utc::now();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let return_model = Return::find_by_id(self.return_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("return {} not found", self.return_id))
            })?;

        self.actor.ensure_branch(return_model.branch_id)?;

        match return_model.status() {
            Some(ReturnStatus::PendingApproval) => {}
            Some(_) => {
                return Err(ServiceError::Conflict(format!(
                    "return {} is not pending",
                    return_model.return_number
                )));
            }
            None => {
                return Err(ServiceError::InternalError(format!(
                    "return {} has unknown status {}",
                    self.return_id, return_model.status
                )));
            }
        }

        let kind = return_model.kind().ok_or_else(|| {
            ServiceError::InternalError(format!(
                "return {} has unknown source kind {}",
                self.return_id, return_model.source_kind
            ))
        })?;
        let branch_id = return_model.branch_id;
        let return_number = return_model.return_number.clone();

        let item_models = ReturnItem::find()
            .filter(return_item::Column::ReturnId.eq(self.return_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        // Match every supplied decision to one return line before any
        // write; a line mentioned with the wrong quantity, or a product
        // not on the return, is a hard failure.
        let verdicts = self.resolve_verdicts(&item_models)?;

        let new_status = match self.decision {
            ReviewDecision::Approve => ReturnStatus::Approved,
            ReviewDecision::Reject => ReturnStatus::Rejected,
        };

        let mut touched = Vec::new();
        let mut refund_note = None;

        match (self.decision, kind) {
            (ReviewDecision::Reject, _) => {
                for item in &item_models {
                    stock::record_workflow_entry(
                        &txn,
                        item.product_id,
                        branch_id,
                        HistoryAction::ReturnRejected,
                        &return_number,
                        self.actor.id,
                        self.notes.as_deref(),
                    )
                    .await?;
                }
            }
            (ReviewDecision::Approve, ReturnKind::Restock) => {
                // Approved lines come back onto the shelf; rejected
                // lines inside an approved return stay out of stock.
                for (item, approved) in item_models.iter().zip(&verdicts) {
                    if *approved {
                        let record = stock::apply_change(
                            &txn,
                            &StockChange {
                                product_id: item.product_id,
                                branch_id,
                                delta: item.quantity,
                                action: HistoryAction::ReturnApproved,
                                reference: return_number.clone(),
                                actor: self.actor.id,
                                notes: None,
                            },
                        )
                        .await?;
                        touched.push((item.product_id, record.current_stock));
                    } else {
                        stock::record_workflow_entry(
                            &txn,
                            item.product_id,
                            branch_id,
                            HistoryAction::ReturnRejected,
                            &return_number,
                            self.actor.id,
                            None,
                        )
                        .await?;
                    }
                }
            }
            (ReviewDecision::Approve, ReturnKind::Delivery) => {
                // Stock already left at creation; approval settles the
                // money by shrinking the originating order's total.
                let refund = self
                    .settle_order_refund(&txn, &return_model, &item_models, &verdicts)
                    .await?;
                refund_note = Some(format!("refund {} against order total", refund));
                for (item, approved) in item_models.iter().zip(&verdicts) {
                    let (action, note) = if *approved {
                        (HistoryAction::ReturnApproved, refund_note.as_deref())
                    } else {
                        (HistoryAction::ReturnRejected, None)
                    };
                    stock::record_workflow_entry(
                        &txn,
                        item.product_id,
                        branch_id,
                        action,
                        &return_number,
                        self.actor.id,
                        note,
                    )
                    .await?;
                }
            }
        }

        // Persist per-item statuses consistently with the decision.
        let mut updated_items = Vec::with_capacity(item_models.len());
        for (item, approved) in item_models.into_iter().zip(&verdicts) {
            let item_status = match (self.decision, *approved) {
                (ReviewDecision::Reject, _) => ReturnItemStatus::Rejected,
                (ReviewDecision::Approve, true) => ReturnItemStatus::Approved,
                (ReviewDecision::Approve, false) => ReturnItemStatus::Rejected,
            };
            let mut active: return_item::ActiveModel = item.into();
            active.status = Set(item_status.as_str().to_string());
            updated_items.push(
                active
                    .update(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?,
            );
        }

        let mut active: return_entity::ActiveModel = return_model.into();
        active.status = Set(new_status.as_str().to_string());
        active.reviewed_by = Set(Some(self.actor.id));
        active.review_notes = Set(self.notes.clone());
        active.reviewed_at = Set(Some(now));
        active.updated_at = Set(now);
        let updated_return = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let history_row = return_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            return_id: Set(self.return_id),
            status: Set(new_status.as_str().to_string()),
            changed_by: Set(self.actor.id),
            note: Set(self.notes.clone().or(refund_note)),
            created_at: Set(now),
        };
        history_row
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            return_id = %self.return_id,
            return_number = %return_number,
            status = new_status.as_str(),
            "Return reviewed"
        );

        let mut events = vec![Event::ReturnStatusUpdated {
            event_id: Uuid::new_v4(),
            return_id: self.return_id,
            branch_id,
            status: new_status.as_str().to_string(),
        }];
        events.extend(touched.into_iter().map(|(product_id, new_quantity)| {
            Event::stock_changed(
                branch_id,
                product_id,
                new_quantity,
                HistoryAction::ReturnApproved.as_str(),
            )
        }));
        event_sender.send_all(events).await;

        Ok(ReturnWithItems {
            return_request: updated_return,
            items: updated_items,
        })
    }
}

impl ReviewReturnCommand {
    /// Resolves one verdict per return line, in line order.
    ///
    /// Lines without an explicit decision follow the overall decision;
    /// an overall rejection overrides everything.
    fn resolve_verdicts(
        &self,
        items: &[return_item::Model],
    ) -> Result<Vec<bool>, ServiceError> {
        let default_verdict = self.decision == ReviewDecision::Approve;
        let mut verdicts = vec![default_verdict; items.len()];
        let mut consumed = vec![false; items.len()];

        for decision in &self.item_decisions {
            let position = items.iter().enumerate().position(|(idx, item)| {
                !consumed[idx]
                    && item.product_id == decision.product_id
                    && item.quantity == decision.quantity
            });
            let idx = position.ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "review decision for product {} (qty {}) does not match any return item",
                    decision.product_id, decision.quantity
                ))
            })?;
            consumed[idx] = true;
            verdicts[idx] = decision.approve && default_verdict;
        }

        Ok(verdicts)
    }

    /// Recomputes the refund for an approved delivery return and
    /// settles it against the originating order.
    ///
    /// Each approved line must match an order line; a miss is a hard
    /// validation failure. The order total is floored at zero and a
    /// confirmation note is appended.
    async fn settle_order_refund(
        &self,
        txn: &DatabaseTransaction,
        return_model: &return_entity::Model,
        items: &[return_item::Model],
        verdicts: &[bool],
    ) -> Result<Decimal, ServiceError> {
        let order_id = return_model.order_id.ok_or_else(|| {
            ServiceError::InternalError(format!(
                "delivery return {} has no order reference",
                return_model.return_number
            ))
        })?;

        let order_model = Order::find_by_id(order_id)
            .one(txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_id)))?;

        let order_items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut refund = Decimal::ZERO;
        for (item, approved) in items.iter().zip(verdicts) {
            if !approved {
                continue;
            }
            let line = order_items
                .iter()
                .find(|l| l.product_id == item.product_id)
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "product {} is not part of order {}",
                        item.product_id, order_model.order_number
                    ))
                })?;
            refund += line.unit_price * Decimal::from(item.quantity);
        }

        let new_total = (order_model.total_amount - refund).max(Decimal::ZERO);
        let confirmation = format!(
            "Return {} confirmed: {} refunded",
            return_model.return_number, refund
        );
        let notes = match &order_model.notes {
            Some(existing) => format!("{}\n{}", existing, confirmation),
            None => confirmation,
        };

        let mut active: order::ActiveModel = order_model.into();
        active.total_amount = Set(new_total);
        active.notes = Set(Some(notes));
        active.updated_at = Set(Utc::now());
        active
            .update(txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(refund)
    }
}

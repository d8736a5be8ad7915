//! Transaction-level operations on stock records and the history ledger.
//!
//! Every function here takes the caller's connection (usually an open
//! transaction), so a command can compose several quantity changes into
//! one all-or-nothing unit of work. Each successful quantity change
//! appends exactly one movement on the record and one history entry in
//! the ledger.

use crate::{
    entities::{
        stock_history::{self, HistoryAction},
        stock_movement::{self, MovementType},
        stock_record::{self, Entity as StockRecord},
    },
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Parameters for one stock quantity change.
#[derive(Debug, Clone)]
pub struct StockChange {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    /// Signed delta; positive credits, negative debits.
    pub delta: i32,
    pub action: HistoryAction,
    pub reference: String,
    pub actor: Uuid,
    pub notes: Option<String>,
}

pub async fn find_stock<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    branch_id: Uuid,
) -> Result<Option<stock_record::Model>, ServiceError> {
    StockRecord::find()
        .filter(stock_record::Column::ProductId.eq(product_id))
        .filter(stock_record::Column::BranchId.eq(branch_id))
        .one(db)
        .await
        .map_err(ServiceError::DatabaseError)
}

pub async fn require_stock<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    branch_id: Uuid,
) -> Result<stock_record::Model, ServiceError> {
    find_stock(db, product_id, branch_id).await?.ok_or_else(|| {
        ServiceError::NotFound(format!(
            "no stock record for product {} at branch {}",
            product_id, branch_id
        ))
    })
}

/// Creates the stock record for a (product, branch) pair.
///
/// Fails with `Conflict` when a record already exists for the pair; the
/// engine never upserts implicitly. An `initial_stock > 0` is recorded
/// as a delivery in both the movement log and the ledger.
#[allow(clippy::too_many_arguments)]
pub async fn create_record<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    branch_id: Uuid,
    initial_stock: i32,
    min_stock_level: i32,
    max_stock_level: i32,
    reference: &str,
    actor: Uuid,
) -> Result<stock_record::Model, ServiceError> {
    if max_stock_level < min_stock_level {
        return Err(ServiceError::ValidationError(format!(
            "max stock level {} is below min stock level {}",
            max_stock_level, min_stock_level
        )));
    }

    if find_stock(db, product_id, branch_id).await?.is_some() {
        return Err(ServiceError::Conflict(format!(
            "stock record already exists for product {} at branch {}",
            product_id, branch_id
        )));
    }

    let now = Utc::now();
    let record = stock_record::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        branch_id: Set(branch_id),
        current_stock: Set(initial_stock),
        damaged_stock: Set(0),
        min_stock_level: Set(min_stock_level),
        max_stock_level: Set(max_stock_level),
        created_by: Set(actor),
        updated_by: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let record = record.insert(db).await.map_err(ServiceError::DatabaseError)?;

    if initial_stock > 0 {
        append_movement(db, &record, MovementType::In, initial_stock, reference, actor).await?;
        append_history(
            db,
            product_id,
            branch_id,
            HistoryAction::Delivery,
            initial_stock,
            reference,
            actor,
            None,
        )
        .await?;
    }

    debug!(
        product_id = %product_id,
        branch_id = %branch_id,
        initial_stock,
        "Stock record created"
    );

    Ok(record)
}

/// Applies one signed quantity change atomically.
///
/// The debit guard is part of the UPDATE itself
/// (`current_stock = current_stock + delta WHERE current_stock >= -delta`),
/// so the never-negative invariant holds even when a concurrent writer
/// touched the row after this unit of work read it. Returns the
/// refreshed record.
pub async fn apply_change<C: ConnectionTrait>(
    db: &C,
    change: &StockChange,
) -> Result<stock_record::Model, ServiceError> {
    if change.delta == 0 {
        return Err(ServiceError::ValidationError(
            "stock change delta must be non-zero".into(),
        ));
    }

    let result = StockRecord::update_many()
        .col_expr(
            stock_record::Column::CurrentStock,
            Expr::col(stock_record::Column::CurrentStock).add(change.delta),
        )
        .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
        .col_expr(stock_record::Column::UpdatedBy, Expr::value(change.actor))
        .filter(stock_record::Column::ProductId.eq(change.product_id))
        .filter(stock_record::Column::BranchId.eq(change.branch_id))
        .filter(stock_record::Column::CurrentStock.gte(-change.delta))
        .exec(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    if result.rows_affected == 0 {
        // Distinguish a missing record from an insufficient balance.
        let existing = require_stock(db, change.product_id, change.branch_id).await?;
        return Err(ServiceError::InsufficientStock(format!(
            "product {} at branch {} has {} units, cannot apply {}",
            change.product_id, existing.branch_id, existing.current_stock, change.delta
        )));
    }

    let record = require_stock(db, change.product_id, change.branch_id).await?;

    if change.delta < 0 && record.is_below_minimum() {
        warn!(
            product_id = %record.product_id,
            branch_id = %record.branch_id,
            current_stock = record.current_stock,
            min_stock_level = record.min_stock_level,
            "Stock at or below minimum level"
        );
    }

    let movement_type = if change.delta > 0 {
        MovementType::In
    } else {
        MovementType::Out
    };
    append_movement(
        db,
        &record,
        movement_type,
        change.delta.abs(),
        &change.reference,
        change.actor,
    )
    .await?;
    append_history(
        db,
        change.product_id,
        change.branch_id,
        change.action,
        change.delta,
        &change.reference,
        change.actor,
        change.notes.as_deref(),
    )
    .await?;

    Ok(record)
}

/// Moves units from the sellable balance into the damaged balance.
pub async fn mark_damaged<C: ConnectionTrait>(
    db: &C,
    change: &StockChange,
) -> Result<stock_record::Model, ServiceError> {
    if change.delta >= 0 {
        return Err(ServiceError::ValidationError(
            "damaged quantity must be a debit".into(),
        ));
    }

    let record = apply_change(db, change).await?;

    let result = StockRecord::update_many()
        .col_expr(
            stock_record::Column::DamagedStock,
            Expr::col(stock_record::Column::DamagedStock).add(-change.delta),
        )
        .filter(stock_record::Column::Id.eq(record.id))
        .exec(db)
        .await
        .map_err(ServiceError::DatabaseError)?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(record.id));
    }

    require_stock(db, change.product_id, change.branch_id).await
}

/// Updates min/max levels; fails with a validation error when
/// `max < min`, leaving the prior limits untouched.
pub async fn set_limits<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    branch_id: Uuid,
    min_stock_level: i32,
    max_stock_level: i32,
    actor: Uuid,
) -> Result<stock_record::Model, ServiceError> {
    if max_stock_level < min_stock_level {
        return Err(ServiceError::ValidationError(format!(
            "max stock level {} is below min stock level {}",
            max_stock_level, min_stock_level
        )));
    }

    let record = require_stock(db, product_id, branch_id).await?;

    let mut active: stock_record::ActiveModel = record.into();
    active.min_stock_level = Set(min_stock_level);
    active.max_stock_level = Set(max_stock_level);
    active.updated_by = Set(Some(actor));
    active.updated_at = Set(Utc::now());

    active.update(db).await.map_err(ServiceError::DatabaseError)
}

/// Appends a workflow-only ledger entry (zero delta, no movement), used
/// for state transitions that leave the physical quantity untouched.
pub async fn record_workflow_entry<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    branch_id: Uuid,
    action: HistoryAction,
    reference: &str,
    actor: Uuid,
    notes: Option<&str>,
) -> Result<(), ServiceError> {
    append_history(db, product_id, branch_id, action, 0, reference, actor, notes).await
}

async fn append_movement<C: ConnectionTrait>(
    db: &C,
    record: &stock_record::Model,
    movement_type: MovementType,
    quantity: i32,
    reference: &str,
    actor: Uuid,
) -> Result<(), ServiceError> {
    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        stock_record_id: Set(record.id),
        movement_type: Set(movement_type.as_str().to_string()),
        quantity: Set(quantity),
        reference: Set(reference.to_string()),
        actor: Set(actor),
        created_at: Set(Utc::now()),
    };

    movement
        .insert(db)
        .await
        .map(|_| ())
        .map_err(ServiceError::DatabaseError)
}

#[allow(clippy::too_many_arguments)]
async fn append_history<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    branch_id: Uuid,
    action: HistoryAction,
    quantity: i32,
    reference: &str,
    actor: Uuid,
    notes: Option<&str>,
) -> Result<(), ServiceError> {
    let entry = stock_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        branch_id: Set(branch_id),
        action: Set(action.as_str().to_string()),
        quantity: Set(quantity),
        reference: Set(reference.to_string()),
        actor: Set(actor),
        notes: Set(notes.map(|n| n.to_string())),
        created_at: Set(Utc::now()),
    };

    entry
        .insert(db)
        .await
        .map(|_| ())
        .map_err(ServiceError::DatabaseError)
}

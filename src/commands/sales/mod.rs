pub mod create_sale_command;
pub mod delete_sale_command;
pub mod update_sale_command;

pub use create_sale_command::CreateSaleCommand;
pub use delete_sale_command::DeleteSaleCommand;
pub use update_sale_command::UpdateSaleCommand;

use crate::{
    entities::{sale, sale_item, stock_history::HistoryAction},
    errors::ServiceError,
    services::stock::{self, StockChange},
};
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

/// One requested sale line.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SaleItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl SaleItemInput {
    pub(crate) fn check(&self) -> Result<(), ServiceError> {
        self.validate()?;
        if self.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "unit price for product {} must not be negative",
                self.product_id
            )));
        }
        Ok(())
    }

    pub(crate) fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A sale together with its ordered line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleWithItems {
    pub sale: sale::Model,
    pub items: Vec<sale_item::Model>,
}

pub(crate) fn total_amount(items: &[SaleItemInput]) -> Decimal {
    items.iter().map(SaleItemInput::line_total).sum()
}

/// Verifies that every line can be satisfied, before any debit.
///
/// Quantities are aggregated per product so repeated lines for the same
/// product are checked against the combined demand. Any missing record
/// or shortfall fails the whole operation here, with nothing written.
pub(crate) async fn ensure_sufficient<C: ConnectionTrait>(
    db: &C,
    branch_id: Uuid,
    lines: &[(Uuid, i32)],
) -> Result<(), ServiceError> {
    let mut demand: BTreeMap<Uuid, i32> = BTreeMap::new();
    for (product_id, quantity) in lines {
        *demand.entry(*product_id).or_insert(0) += quantity;
    }

    for (product_id, quantity) in demand {
        let record = stock::require_stock(db, product_id, branch_id).await?;
        if !record.has_sufficient(quantity) {
            return Err(ServiceError::InsufficientStock(format!(
                "product {} at branch {} has {} units, {} requested",
                product_id, branch_id, record.current_stock, quantity
            )));
        }
    }

    Ok(())
}

/// Applies one debit or credit per sale line, appending one ledger entry
/// per line. Returns the final quantity per product for event emission.
pub(crate) async fn apply_item_changes<C: ConnectionTrait>(
    db: &C,
    branch_id: Uuid,
    lines: &[(Uuid, i32)],
    direction: i32,
    action: HistoryAction,
    reference: &str,
    actor: Uuid,
) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    let mut final_quantities: BTreeMap<Uuid, i32> = BTreeMap::new();

    for (product_id, quantity) in lines {
        let record = stock::apply_change(
            db,
            &StockChange {
                product_id: *product_id,
                branch_id,
                delta: direction * quantity,
                action,
                reference: reference.to_string(),
                actor,
                notes: None,
            },
        )
        .await?;
        final_quantities.insert(*product_id, record.current_stock);
    }

    Ok(final_quantities.into_iter().collect())
}

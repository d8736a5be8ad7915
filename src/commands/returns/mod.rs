pub mod create_return_command;
pub mod review_return_command;

pub use create_return_command::CreateReturnCommand;
pub use review_return_command::{ReturnItemDecision, ReviewDecision, ReviewReturnCommand};

use crate::entities::{return_entity, return_item};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// How long after delivery an order still accepts returns.
pub const RETURN_WINDOW_DAYS: i64 = 3;

/// One requested return line.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReturnItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub price: Decimal,
    pub reason: crate::entities::return_item::ReturnReason,
}

/// A return together with its line items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnWithItems {
    pub return_request: return_entity::Model,
    pub items: Vec<return_item::Model>,
}

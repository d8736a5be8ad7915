pub mod adjust_stock_command;
pub mod bulk_create_stock_command;
pub mod create_stock_record_command;
pub mod mark_stock_damaged_command;
pub mod restock_stock_command;
pub mod set_stock_limits_command;

pub use adjust_stock_command::AdjustStockCommand;
pub use bulk_create_stock_command::{BulkCreateStockCommand, BulkStockEntry};
pub use create_stock_record_command::CreateStockRecordCommand;
pub use mark_stock_damaged_command::MarkStockDamagedCommand;
pub use restock_stock_command::RestockStockCommand;
pub use set_stock_limits_command::SetStockLimitsCommand;

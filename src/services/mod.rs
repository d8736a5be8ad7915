pub mod history;
pub mod inventory;
pub mod returns;
pub mod sales;
pub mod sequences;
pub mod stock;

pub use history::HistoryService;
pub use inventory::InventoryService;
pub use returns::ReturnService;
pub use sales::SaleService;

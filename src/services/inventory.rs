use crate::{
    commands::{
        inventory::{
            AdjustStockCommand, BulkCreateStockCommand, CreateStockRecordCommand,
            MarkStockDamagedCommand, RestockStockCommand, SetStockLimitsCommand,
        },
        Command,
    },
    db::DbPool,
    entities::{
        stock_movement::{self, Entity as StockMovement},
        stock_record::{self, Entity as StockRecord},
    },
    errors::ServiceError,
    events::EventSender,
    services::stock,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Service for managing stock records
#[derive(Clone)]
pub struct InventoryService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    /// Creates a new inventory service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates the stock record for a (product, branch) pair
    #[instrument(skip(self, command))]
    pub async fn create_stock_record(
        &self,
        command: CreateStockRecordCommand,
    ) -> Result<stock_record::Model, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Applies a manual stock correction
    #[instrument(skip(self, command))]
    pub async fn adjust_stock(
        &self,
        command: AdjustStockCommand,
    ) -> Result<stock_record::Model, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Replenishes stock from a delivery
    #[instrument(skip(self, command))]
    pub async fn restock(
        &self,
        command: RestockStockCommand,
    ) -> Result<stock_record::Model, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Writes off damaged units
    #[instrument(skip(self, command))]
    pub async fn mark_damaged(
        &self,
        command: MarkStockDamagedCommand,
    ) -> Result<stock_record::Model, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Updates min/max stock levels
    #[instrument(skip(self, command))]
    pub async fn set_stock_limits(
        &self,
        command: SetStockLimitsCommand,
    ) -> Result<stock_record::Model, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Creates many stock records in one unit of work
    #[instrument(skip(self, command))]
    pub async fn bulk_create_stock(
        &self,
        command: BulkCreateStockCommand,
    ) -> Result<Vec<stock_record::Model>, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Gets the stock record for a product at a branch
    #[instrument(skip(self))]
    pub async fn get_stock(
        &self,
        product_id: Uuid,
        branch_id: Uuid,
    ) -> Result<Option<stock_record::Model>, ServiceError> {
        stock::find_stock(self.db_pool.as_ref(), product_id, branch_id).await
    }

    /// Lists stock records, optionally scoped to one branch
    #[instrument(skip(self))]
    pub async fn list_stock(
        &self,
        branch_id: Option<Uuid>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_record::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = StockRecord::find().order_by_desc(stock_record::Column::UpdatedAt);
        if let Some(branch_id) = branch_id {
            query = query.filter(stock_record::Column::BranchId.eq(branch_id));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let records = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((records, total))
    }

    /// Lists a record's embedded movement log, newest first
    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        stock_record_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();

        let paginator = StockMovement::find()
            .filter(stock_movement::Column::StockRecordId.eq(stock_record_id))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let movements = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((movements, total))
    }
}

use crate::{
    commands::{
        sales::{CreateSaleCommand, DeleteSaleCommand, SaleWithItems, UpdateSaleCommand},
        Command,
    },
    db::DbPool,
    entities::{
        sale::{self, Entity as Sale},
        sale_item::{self, Entity as SaleItem},
    },
    errors::ServiceError,
    events::EventSender,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Service for managing point-of-sale transactions
#[derive(Clone)]
pub struct SaleService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl SaleService {
    /// Creates a new sale service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Creates a sale, debiting stock when it completes immediately
    #[instrument(skip(self, command))]
    pub async fn create_sale(
        &self,
        command: CreateSaleCommand,
    ) -> Result<SaleWithItems, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Updates a sale's items and/or status
    #[instrument(skip(self, command))]
    pub async fn update_sale(
        &self,
        command: UpdateSaleCommand,
    ) -> Result<SaleWithItems, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Deletes a sale, reversing its stock debit first
    #[instrument(skip(self, command))]
    pub async fn delete_sale(&self, command: DeleteSaleCommand) -> Result<(), ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Gets a sale with its line items
    #[instrument(skip(self))]
    pub async fn get_sale(&self, sale_id: Uuid) -> Result<Option<SaleWithItems>, ServiceError> {
        let db = self.db_pool.as_ref();

        let Some(sale_model) = Sale::find_by_id(sale_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
        else {
            return Ok(None);
        };

        let items = SaleItem::find()
            .filter(sale_item::Column::SaleId.eq(sale_id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(Some(SaleWithItems {
            sale: sale_model,
            items,
        }))
    }

    /// Lists sales, newest first, optionally scoped to one branch
    #[instrument(skip(self))]
    pub async fn list_sales(
        &self,
        branch_id: Option<Uuid>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<sale::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = Sale::find().order_by_desc(sale::Column::CreatedAt);
        if let Some(branch_id) = branch_id {
            query = query.filter(sale::Column::BranchId.eq(branch_id));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let sales = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((sales, total))
    }
}

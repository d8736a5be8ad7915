use crate::{
    db::DbPool,
    entities::stock_history::{self, Entity as StockHistory, HistoryAction},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Filter for ledger queries; every field is optional and filters
/// conjunctively.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub product_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub action: Option<HistoryAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Read-only query surface over the append-only history ledger.
///
/// The writer side lives inside the stock store operations; nothing
/// here can mutate or delete an entry.
#[derive(Clone)]
pub struct HistoryService {
    db_pool: Arc<DbPool>,
}

impl HistoryService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Queries ledger entries, newest first, with pagination
    #[instrument(skip(self))]
    pub async fn query(
        &self,
        filter: HistoryQuery,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_history::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = StockHistory::find().order_by_desc(stock_history::Column::CreatedAt);
        if let Some(product_id) = filter.product_id {
            query = query.filter(stock_history::Column::ProductId.eq(product_id));
        }
        if let Some(branch_id) = filter.branch_id {
            query = query.filter(stock_history::Column::BranchId.eq(branch_id));
        }
        if let Some(action) = filter.action {
            query = query.filter(stock_history::Column::Action.eq(action.as_str()));
        }
        if let Some(from) = filter.from {
            query = query.filter(stock_history::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(stock_history::Column::CreatedAt.lte(to));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let entries = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((entries, total))
    }
}

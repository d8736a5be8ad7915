use crate::{
    commands::{
        returns::{CreateReturnCommand, ReturnWithItems, ReviewReturnCommand},
        Command,
    },
    db::DbPool,
    entities::{
        return_entity::{self, Entity as Return, ReturnStatus},
        return_item::{self, Entity as ReturnItem},
        return_status_history::{self, Entity as ReturnStatusHistory},
    },
    errors::ServiceError,
    events::EventSender,
};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Service for managing return requests
#[derive(Clone)]
pub struct ReturnService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ReturnService {
    /// Creates a new return service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Opens a return request in the pending-approval state
    #[instrument(skip(self, command))]
    pub async fn create_return(
        &self,
        command: CreateReturnCommand,
    ) -> Result<ReturnWithItems, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Reviews a pending return into a terminal state
    #[instrument(skip(self, command))]
    pub async fn review_return(
        &self,
        command: ReviewReturnCommand,
    ) -> Result<ReturnWithItems, ServiceError> {
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Gets a return with its line items
    #[instrument(skip(self))]
    pub async fn get_return(
        &self,
        return_id: Uuid,
    ) -> Result<Option<ReturnWithItems>, ServiceError> {
        let db = self.db_pool.as_ref();

        let Some(return_model) = Return::find_by_id(return_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
        else {
            return Ok(None);
        };

        let items = ReturnItem::find()
            .filter(return_item::Column::ReturnId.eq(return_id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(Some(ReturnWithItems {
            return_request: return_model,
            items,
        }))
    }

    /// Lists a return's status transitions, oldest first
    #[instrument(skip(self))]
    pub async fn get_status_history(
        &self,
        return_id: Uuid,
    ) -> Result<Vec<return_status_history::Model>, ServiceError> {
        let db = self.db_pool.as_ref();

        ReturnStatusHistory::find()
            .filter(return_status_history::Column::ReturnId.eq(return_id))
            .order_by_asc(return_status_history::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Lists returns, newest first, with optional branch/status filters
    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        branch_id: Option<Uuid>,
        status: Option<ReturnStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<return_entity::Model>, u64), ServiceError> {
        let db = self.db_pool.as_ref();

        let mut query = Return::find().order_by_desc(return_entity::Column::CreatedAt);
        if let Some(branch_id) = branch_id {
            query = query.filter(return_entity::Column::BranchId.eq(branch_id));
        }
        if let Some(status) = status {
            query = query.filter(return_entity::Column::Status.eq(status.as_str()));
        }

        let paginator = query.paginate(db, limit);
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let returns = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((returns, total))
    }
}

use crate::{db::DbPool, errors::ServiceError, events::EventSender};
use async_trait::async_trait;
use std::sync::Arc;

/// Command trait for implementing the Command Pattern
///
/// A command encapsulates one external operation as a single unit of
/// work: `execute` opens one database transaction, performs every record
/// mutation inside it, and only after a successful commit sends the
/// domain events the operation produced. Any failure before the commit
/// rolls the whole unit back with zero persisted side effects.
#[async_trait]
pub trait Command: Send + Sync {
    /// The return type of the command when executed successfully
    type Result;

    /// Execute the command with the given dependencies
    ///
    /// # Arguments
    /// * `db_pool` - Database connection pool for persistence operations
    /// * `event_sender` - Channel to publish domain events post-commit
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError>;
}

pub mod inventory;
pub mod returns;
pub mod sales;

use crate::errors::ServiceError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The already-authenticated actor on whose behalf a command runs.
///
/// Authentication and role policy live outside the engine; the engine
/// still re-validates branch ownership defensively before touching
/// another branch's records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    /// `None` grants access to every branch (back-office scope);
    /// `Some(branch)` restricts the actor to that single branch.
    pub branch_scope: Option<Uuid>,
}

impl Actor {
    pub fn new(id: Uuid, name: impl Into<String>, branch_scope: Option<Uuid>) -> Self {
        Self {
            id,
            name: name.into(),
            branch_scope,
        }
    }

    /// Back-office actor with access to every branch.
    pub fn unscoped(id: Uuid, name: impl Into<String>) -> Self {
        Self::new(id, name, None)
    }

    /// Actor restricted to a single branch.
    pub fn scoped(id: Uuid, name: impl Into<String>, branch_id: Uuid) -> Self {
        Self::new(id, name, Some(branch_id))
    }

    pub fn can_access(&self, branch_id: Uuid) -> bool {
        match self.branch_scope {
            None => true,
            Some(scope) => scope == branch_id,
        }
    }

    /// Fails with `Unauthorized` when the actor's scope does not cover
    /// the target branch. Called before any read of mutable state.
    pub fn ensure_branch(&self, branch_id: Uuid) -> Result<(), ServiceError> {
        if self.can_access(branch_id) {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized(format!(
                "actor {} is not scoped to branch {}",
                self.id, branch_id
            )))
        }
    }
}

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall state of a return request.
///
/// Transitions happen exactly once, from the pending state to a terminal
/// state; terminal states are permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    PendingApproval,
    Approved,
    Rejected,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::PendingApproval => "pending_approval",
            ReturnStatus::Approved => "approved",
            ReturnStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            // Older rows carry the short form.
            "pending_approval" | "pending" => Some(ReturnStatus::PendingApproval),
            "approved" => Some(ReturnStatus::Approved),
            "rejected" => Some(ReturnStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReturnStatus::PendingApproval)
    }
}

/// Which of the two return flows this request follows.
///
/// `Delivery` returns goods from a delivered order back toward the
/// supplier: stock is debited at creation and the review adjusts the
/// originating order's total. `Restock` is branch-initiated: no stock
/// effect at creation, approved items are credited back at review time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    Delivery,
    Restock,
}

impl ReturnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnKind::Delivery => "delivery",
            ReturnKind::Restock => "restock",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "delivery" => Some(ReturnKind::Delivery),
            "restock" => Some(ReturnKind::Restock),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "returns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub return_number: String,
    pub source_kind: String,
    /// Originating order; required for the delivery kind.
    pub order_id: Option<Uuid>,
    /// Originating sale reference for the restock kind, when known.
    pub sale_id: Option<Uuid>,
    pub branch_id: Uuid,
    pub status: String,
    pub created_by: Uuid,
    pub reviewed_by: Option<Uuid>,
    pub review_notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::return_item::Entity")]
    ReturnItem,
    #[sea_orm(has_many = "super::return_status_history::Entity")]
    ReturnStatusHistory,
}

impl Related<super::return_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReturnItem.def()
    }
}

impl Related<super::return_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReturnStatusHistory.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn status(&self) -> Option<ReturnStatus> {
        ReturnStatus::from_str(&self.status)
    }

    pub fn kind(&self) -> Option<ReturnKind> {
        ReturnKind::from_str(&self.source_kind)
    }
}

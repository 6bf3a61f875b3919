//! Budget allocation entity - One predicted budget per `(user_id, event_id)`.
//!
//! Rows are written once by an allocation pass and deleted when the source calendar
//! event disappears. A rescheduled event only has its start and title rewritten; the
//! budget itself never changes in place.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Budget allocation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budget_allocations")]
pub struct Model {
    /// Owner of the allocation
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// External calendar event identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub event_id: String,
    /// Event title, denormalized for display and audit
    pub title: String,
    /// Predicted budget in whole currency units (never negative)
    pub predicted_budget: i64,
    /// Collaborator's free-text reasoning (advisory only)
    pub reasoning: String,
    /// Wall-clock start of the event, used to sum budgets per day
    pub event_start: DateTime,
    /// When the allocation was stored
    pub created_at: DateTime,
}

/// `BudgetAllocation` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

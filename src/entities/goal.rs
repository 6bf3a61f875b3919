//! Goal entity - A savings target the user is working towards.
//!
//! Status is stored as text: `"active"`, `"completed"`, or `"failed"`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Goal database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "goals")]
pub struct Model {
    /// Unique identifier for the goal
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the goal
    pub user_id: String,
    /// What the user is saving for (e.g., "New Laptop")
    pub name: String,
    /// Amount needed
    pub target_amount: f64,
    /// Amount saved so far
    pub current_amount: f64,
    /// `"active"`, `"completed"`, or `"failed"`
    pub status: String,
    /// When the goal was created
    pub created_at: DateTime,
    /// When the goal was last modified
    pub updated_at: DateTime,
}

/// `Goal` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

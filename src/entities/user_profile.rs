//! User profile entity - Durable streak simulator state and score per user.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User profile database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_profiles")]
pub struct Model {
    /// External user identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Name shown on leaderboards
    pub display_name: String,
    /// Elo-like score, never negative
    pub score: i64,
    /// Next simulated day to be scored
    pub simulated_date: Date,
    /// Consecutive successful days before `simulated_date`
    pub streak_count: i32,
    /// When the profile was last modified
    pub updated_at: DateTime,
}

/// `UserProfile` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

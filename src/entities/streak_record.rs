//! Streak record entity - Append-only per-day streak log.
//!
//! Keyed by `(user_id, date)`. A `streak_number` of 0 marks a broken day; N > 0 means
//! N consecutive successful days ending on `date`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Streak record database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "streak_records")]
pub struct Model {
    /// Owner of the record
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// Calendar day the record covers
    #[sea_orm(primary_key, auto_increment = false)]
    pub date: Date,
    /// Consecutive successful days ending on `date` (0 when the day failed)
    pub streak_number: i32,
}

/// `StreakRecord` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

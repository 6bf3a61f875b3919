//! Savings goal operations.
//!
//! A user has at most one active goal at a time. Contributions add to its saved amount;
//! finishing it records whether the target was reached, and giving up removes it.

use crate::{
    entities::{Goal, goal},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::{fmt, str::FromStr};
use tracing::info;

/// Lifecycle state of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStatus {
    /// Still being saved for
    Active,
    /// Finished with the target reached
    Completed,
    /// Finished short of the target
    Failed,
}

impl GoalStatus {
    /// Stored text form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation {
                message: format!("unknown goal status '{other}'"),
            }),
        }
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

/// Starts a new active goal.
///
/// # Errors
/// `Error::Validation` for a blank name, `Error::InvalidAmount` for a target that is not
/// a positive finite number, `Error::GoalAlreadyActive` if one is already running.
pub async fn create_goal(
    db: &DatabaseConnection,
    user_id: &str,
    name: &str,
    target_amount: f64,
) -> Result<goal::Model> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation {
            message: "goal name cannot be empty".to_string(),
        });
    }
    validate_amount(target_amount)?;

    let txn = db.begin().await?;

    if let Some(active) = get_active_goal(&txn, user_id).await? {
        return Err(Error::GoalAlreadyActive { name: active.name });
    }

    let now = Utc::now().naive_utc();
    let created = goal::ActiveModel {
        user_id: Set(user_id.to_string()),
        name: Set(name.to_string()),
        target_amount: Set(target_amount),
        current_amount: Set(0.0),
        status: Set(GoalStatus::Active.as_str().to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(user_id, "Goal '{}' started with target {:.2}", created.name, target_amount);

    Ok(created)
}

/// The user's active goal, if any.
pub async fn get_active_goal<C>(db: &C, user_id: &str) -> Result<Option<goal::Model>>
where
    C: ConnectionTrait,
{
    Goal::find()
        .filter(goal::Column::UserId.eq(user_id))
        .filter(goal::Column::Status.eq(GoalStatus::Active.as_str()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// The user's most recently created goal in any state.
pub async fn get_latest_goal<C>(db: &C, user_id: &str) -> Result<Option<goal::Model>>
where
    C: ConnectionTrait,
{
    Goal::find()
        .filter(goal::Column::UserId.eq(user_id))
        .order_by_desc(goal::Column::CreatedAt)
        .order_by_desc(goal::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

async fn require_active_goal<C>(db: &C, user_id: &str) -> Result<goal::Model>
where
    C: ConnectionTrait,
{
    get_active_goal(db, user_id)
        .await?
        .ok_or_else(|| Error::GoalNotFound {
            user_id: user_id.to_string(),
        })
}

/// Adds `amount` to the active goal's saved total.
pub async fn contribute_to_goal(
    db: &DatabaseConnection,
    user_id: &str,
    amount: f64,
) -> Result<goal::Model> {
    validate_amount(amount)?;

    let txn = db.begin().await?;
    let active = require_active_goal(&txn, user_id).await?;
    let new_amount = active.current_amount + amount;

    let mut model: goal::ActiveModel = active.into();
    model.current_amount = Set(new_amount);
    model.updated_at = Set(Utc::now().naive_utc());
    let updated = model.update(&txn).await?;

    txn.commit().await?;
    Ok(updated)
}

/// Closes the active goal as completed if the target was reached, failed otherwise.
pub async fn finish_goal(db: &DatabaseConnection, user_id: &str) -> Result<goal::Model> {
    let txn = db.begin().await?;
    let active = require_active_goal(&txn, user_id).await?;
    let status = if active.current_amount >= active.target_amount {
        GoalStatus::Completed
    } else {
        GoalStatus::Failed
    };

    let mut model: goal::ActiveModel = active.into();
    model.status = Set(status.as_str().to_string());
    model.updated_at = Set(Utc::now().naive_utc());
    let updated = model.update(&txn).await?;

    txn.commit().await?;
    info!(user_id, "Goal '{}' finished as {}", updated.name, status);
    Ok(updated)
}

/// Deletes the active goal and returns it.
pub async fn give_up_goal(db: &DatabaseConnection, user_id: &str) -> Result<goal::Model> {
    let txn = db.begin().await?;
    let active = require_active_goal(&txn, user_id).await?;
    Goal::delete_by_id(active.id).exec(&txn).await?;
    txn.commit().await?;

    info!(user_id, "Gave up on goal '{}'", active.name);
    Ok(active)
}

/// Saved share of the target as a percentage in `0..=100`.
#[must_use]
pub fn goal_progress_percent(goal: &goal::Model) -> f64 {
    if goal.target_amount <= 0.0 {
        return 0.0;
    }
    (goal.current_amount / goal.target_amount * 100.0).clamp(0.0, 100.0)
}

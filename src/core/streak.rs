//! Streak simulation and Elo-like scoring.
//!
//! The simulator steps one day at a time: it compares what was actually spent against
//! the day's allocated budget, extends or breaks the streak, adjusts the score, and
//! appends one record per day. The durable state lives in `user_profiles`; the
//! in-memory [`StreakSimulator`] only moves forward after the database commit succeeds.

use crate::{
    core::{allocator, rank},
    entities::{StreakRecord, UserProfile, streak_record, user_profile},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use tracing::{info, instrument};

/// Score change for spending nothing on a day with no budget.
pub const ZERO_SPEND_NO_BUDGET_BONUS: i64 = 15;
/// Score change for spending nothing on a day with a budget.
pub const ZERO_SPEND_BONUS: i64 = 25;
/// Score change for any spending on a day with no budget.
pub const NO_BUDGET_PENALTY: i64 = -50;

/// Whether a day stayed within budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DayStatus {
    /// Spend did not exceed the budget
    Success,
    /// Spend exceeded the budget
    Failure,
}

impl DayStatus {
    /// Lowercase name (`"success"` / `"failure"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Classifies a day.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn day_status(actual_spend: f64, budget_for_day: i64) -> DayStatus {
    if actual_spend <= budget_for_day as f64 {
        DayStatus::Success
    } else {
        DayStatus::Failure
    }
}

/// Score change for one day.
///
/// - success, nothing spent: +15 with no budget, +25 otherwise
/// - success, something spent: percentage of the budget saved
/// - failure with a budget: minus the percentage overspent
/// - failure with no budget: flat -50
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn score_delta(actual_spend: f64, budget_for_day: i64) -> i64 {
    let budget_for_day = budget_for_day.max(0);
    let budget = budget_for_day as f64;

    match day_status(actual_spend, budget_for_day) {
        DayStatus::Success if actual_spend <= 0.0 => {
            if budget_for_day == 0 {
                ZERO_SPEND_NO_BUDGET_BONUS
            } else {
                ZERO_SPEND_BONUS
            }
        }
        // spend > 0 and spend <= budget, so budget > 0 here
        DayStatus::Success => (((budget - actual_spend) / budget) * 100.0).round() as i64,
        DayStatus::Failure if budget_for_day > 0 => {
            -((((actual_spend - budget) / budget) * 100.0).round() as i64)
        }
        DayStatus::Failure => NO_BUDGET_PENALTY,
    }
}

/// Applies a delta, flooring the score at zero.
#[must_use]
pub const fn apply_delta(score: i64, delta: i64) -> i64 {
    let next = score.saturating_add(delta);
    if next < 0 { 0 } else { next }
}

/// Per-user simulator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakState {
    /// Owner of the state
    pub user_id: String,
    /// Next day to be scored
    pub current_date: NaiveDate,
    /// Consecutive successful days before `current_date`
    pub streak_count: u32,
    /// Elo-like score, never negative
    pub score: i64,
}

impl TryFrom<user_profile::Model> for StreakState {
    type Error = Error;

    fn try_from(profile: user_profile::Model) -> Result<Self> {
        Ok(Self {
            user_id: profile.user_id,
            current_date: profile.simulated_date,
            streak_count: u32::try_from(profile.streak_count)?,
            score: profile.score.max(0),
        })
    }
}

/// Result of advancing one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayOutcome {
    /// Day that was scored
    pub date: NaiveDate,
    /// Whether it stayed within budget
    pub status: DayStatus,
    /// Budget the spend was compared against
    pub budget_for_day: i64,
    /// Score change applied
    pub delta: i64,
    /// Streak after the day
    pub new_streak_count: u32,
    /// Score after the day
    pub new_score: i64,
    /// Tier before the day
    pub previous_rank: &'static str,
    /// Tier after the day
    pub new_rank: &'static str,
    /// Whether the day moved the user into a higher tier
    pub ranked_up: bool,
}

/// Day-by-day streak state machine for one user.
#[derive(Debug, Clone)]
pub struct StreakSimulator {
    state: StreakState,
}

impl StreakSimulator {
    /// Wraps an existing state.
    #[must_use]
    pub const fn new(state: StreakState) -> Self {
        Self { state }
    }

    /// Loads the user's durable state, creating a fresh profile (score 0, no streak,
    /// starting at `start_date`) on first use.
    pub async fn load<C>(
        db: &C,
        user_id: &str,
        display_name: &str,
        start_date: NaiveDate,
    ) -> Result<Self>
    where
        C: ConnectionTrait,
    {
        if let Some(profile) = UserProfile::find_by_id(user_id.to_string()).one(db).await? {
            return Ok(Self::new(StreakState::try_from(profile)?));
        }

        let profile = user_profile::ActiveModel {
            user_id: Set(user_id.to_string()),
            display_name: Set(display_name.to_string()),
            score: Set(0),
            simulated_date: Set(start_date),
            streak_count: Set(0),
            updated_at: Set(Utc::now().naive_utc()),
        }
        .insert(db)
        .await?;
        info!(user_id, "Created profile starting {}", start_date);

        Ok(Self::new(StreakState::try_from(profile)?))
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &StreakState {
        &self.state
    }

    /// Computes what advancing would do, without touching any state.
    ///
    /// # Errors
    /// Returns `Error::InvalidAmount` if `actual_spend` is negative or not finite, or
    /// if `budget_for_day` is negative.
    #[allow(clippy::cast_precision_loss)]
    pub fn preview(&self, actual_spend: f64, budget_for_day: i64) -> Result<DayOutcome> {
        if !actual_spend.is_finite() || actual_spend < 0.0 {
            return Err(Error::InvalidAmount {
                amount: actual_spend,
            });
        }
        if budget_for_day < 0 {
            return Err(Error::InvalidAmount {
                amount: budget_for_day as f64,
            });
        }

        let status = day_status(actual_spend, budget_for_day);
        let delta = score_delta(actual_spend, budget_for_day);
        let new_streak_count = match status {
            DayStatus::Success => self.state.streak_count.saturating_add(1),
            DayStatus::Failure => 0,
        };
        let new_score = apply_delta(self.state.score, delta);
        let previous_rank = rank::rank_of(self.state.score);
        let new_rank = rank::rank_of(new_score);

        Ok(DayOutcome {
            date: self.state.current_date,
            status,
            budget_for_day,
            delta,
            new_streak_count,
            new_score,
            previous_rank,
            new_rank,
            ranked_up: rank::rank_index(new_score) > rank::rank_index(self.state.score),
        })
    }

    /// Scores `current_date`, appends its streak record, and moves to the next day.
    ///
    /// The record insert and the profile update commit together. If either fails the
    /// in-memory state is left exactly as it was. A day that already has a record cannot
    /// be scored again.
    ///
    /// # Errors
    /// `Error::InvalidAmount` for bad inputs (see [`Self::preview`]),
    /// `Error::Persistence` if the write fails.
    #[instrument(skip(self, db), fields(user_id = %self.state.user_id, date = %self.state.current_date))]
    pub async fn advance_day<C>(
        &mut self,
        db: &C,
        actual_spend: f64,
        budget_for_day: i64,
    ) -> Result<DayOutcome>
    where
        C: TransactionTrait,
    {
        let outcome = self.preview(actual_spend, budget_for_day)?;
        let next_date = self
            .state
            .current_date
            .succ_opt()
            .ok_or_else(|| Error::Validation {
                message: format!("cannot advance past {}", self.state.current_date),
            })?;
        let streak_number = i32::try_from(outcome.new_streak_count)?;

        let txn = db.begin().await?;

        streak_record::ActiveModel {
            user_id: Set(self.state.user_id.clone()),
            date: Set(outcome.date),
            streak_number: Set(streak_number),
        }
        .insert(&txn)
        .await?;

        user_profile::ActiveModel {
            user_id: Set(self.state.user_id.clone()),
            score: Set(outcome.new_score),
            simulated_date: Set(next_date),
            streak_count: Set(streak_number),
            updated_at: Set(Utc::now().naive_utc()),
            ..Default::default()
        }
        .update(&txn)
        .await?;

        txn.commit().await?;

        self.state.current_date = next_date;
        self.state.streak_count = outcome.new_streak_count;
        self.state.score = outcome.new_score;

        info!(
            status = outcome.status.as_str(),
            delta = outcome.delta,
            "Day scored: spent {:.2} of {}, streak {}, score {}",
            actual_spend,
            budget_for_day,
            outcome.new_streak_count,
            outcome.new_score
        );
        if outcome.ranked_up {
            info!("Ranked up to {}", outcome.new_rank);
        }

        Ok(outcome)
    }

    /// Advances using the stored allocations for `current_date` as the day's budget.
    pub async fn advance_with_allocations(
        &mut self,
        db: &DatabaseConnection,
        actual_spend: f64,
    ) -> Result<DayOutcome> {
        let budget =
            allocator::budget_for_day(db, &self.state.user_id, self.state.current_date).await?;
        self.advance_day(db, actual_spend, budget).await
    }
}

/// Streak records for a user, newest first, optionally limited.
pub async fn get_streak_history<C>(
    db: &C,
    user_id: &str,
    limit: Option<u64>,
) -> Result<Vec<streak_record::Model>>
where
    C: ConnectionTrait,
{
    StreakRecord::find()
        .filter(streak_record::Column::UserId.eq(user_id))
        .order_by_desc(streak_record::Column::Date)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Streak on the most recent recorded day (0 when nothing is recorded).
pub async fn current_streak<C>(db: &C, user_id: &str) -> Result<i32>
where
    C: ConnectionTrait,
{
    Ok(get_streak_history(db, user_id, Some(1))
        .await?
        .first()
        .map_or(0, |record| record.streak_number))
}

/// Longest streak ever recorded for a user.
pub async fn best_streak<C>(db: &C, user_id: &str) -> Result<i32>
where
    C: ConnectionTrait,
{
    Ok(StreakRecord::find()
        .filter(streak_record::Column::UserId.eq(user_id))
        .order_by_desc(streak_record::Column::StreakNumber)
        .one(db)
        .await?
        .map_or(0, |record| record.streak_number))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use proptest::prelude::*;

    fn state(streak_count: u32, score: i64) -> StreakState {
        StreakState {
            user_id: "user-1".to_string(),
            current_date: date(2026, 3, 10),
            streak_count,
            score,
        }
    }

    #[test]
    fn test_score_delta_table() {
        assert_eq!(score_delta(0.0, 0), 15);
        assert_eq!(score_delta(0.0, 100), 25);
        assert_eq!(score_delta(50.0, 100), 50);
        assert_eq!(score_delta(100.0, 100), 0);
        assert_eq!(score_delta(150.0, 100), -50);
        assert_eq!(score_delta(10.0, 0), -50);
        assert_eq!(score_delta(1000.0, 0), -50);
    }

    #[test]
    fn test_score_delta_rounds_half_up() {
        // 12.5% saved
        assert_eq!(score_delta(87.5, 100), 13);
        // 12.5% over
        assert_eq!(score_delta(112.5, 100), -13);
        assert_eq!(score_delta(1.0, 3), 67);
    }

    #[test]
    fn test_day_status() {
        assert_eq!(day_status(100.0, 100), DayStatus::Success);
        assert_eq!(day_status(100.01, 100), DayStatus::Failure);
        assert_eq!(day_status(0.0, 0), DayStatus::Success);
        assert_eq!(DayStatus::Failure.as_str(), "failure");
    }

    #[test]
    fn test_preview_streak_transitions() {
        let sim = StreakSimulator::new(state(4, 200));

        let good = sim.preview(20.0, 40).unwrap();
        assert_eq!(good.status, DayStatus::Success);
        assert_eq!(good.new_streak_count, 5);
        assert_eq!(good.new_score, 250);

        let bad = sim.preview(80.0, 40).unwrap();
        assert_eq!(bad.status, DayStatus::Failure);
        assert_eq!(bad.new_streak_count, 0);
        assert_eq!(bad.new_score, 100);
        assert_eq!(bad.new_rank, "Bronze Budgeter");

        // preview never mutates
        assert_eq!(sim.state(), &state(4, 200));
    }

    #[test]
    fn test_preview_floors_score_and_detects_rank_up() {
        let sim = StreakSimulator::new(state(0, 30));
        assert_eq!(sim.preview(500.0, 100).unwrap().new_score, 0);

        let sim = StreakSimulator::new(state(0, 90));
        let outcome = sim.preview(0.0, 100).unwrap();
        assert_eq!(outcome.new_score, 115);
        assert!(outcome.ranked_up);
        assert_eq!(outcome.previous_rank, "Iron Intern");
        assert_eq!(outcome.new_rank, "Bronze Budgeter");
    }

    #[test]
    fn test_preview_rejects_bad_inputs() {
        let sim = StreakSimulator::new(state(0, 0));
        assert!(matches!(sim.preview(-1.0, 10), Err(Error::InvalidAmount { .. })));
        assert!(matches!(sim.preview(f64::NAN, 10), Err(Error::InvalidAmount { .. })));
        assert!(matches!(sim.preview(f64::INFINITY, 10), Err(Error::InvalidAmount { .. })));
        assert!(matches!(sim.preview(1.0, -10), Err(Error::InvalidAmount { .. })));
    }

    proptest! {
        #[test]
        fn prop_score_never_negative(
            days in prop::collection::vec((0.0f64..10_000.0, 0i64..2_000), 1..60),
            start in 0i64..2_000,
        ) {
            let mut score = start;
            for (spend, budget) in days {
                score = apply_delta(score, score_delta(spend, budget));
                prop_assert!(score >= 0);
            }
        }

        #[test]
        fn prop_delta_sign_follows_status(spend in 0.0f64..1_000.0, budget in 0i64..1_000) {
            if day_status(spend, budget) == DayStatus::Success {
                prop_assert!(score_delta(spend, budget) >= 0);
            } else {
                prop_assert!(score_delta(spend, budget) <= 0);
            }
        }
    }

    #[tokio::test]
    async fn test_advance_day_persists_and_moves_forward() -> Result<()> {
        let db = setup_test_db().await?;
        let mut sim = StreakSimulator::load(&db, "user-1", "Sam", date(2026, 3, 10)).await?;

        let outcome = sim.advance_day(&db, 50.0, 100).await?;
        assert_eq!(outcome.date, date(2026, 3, 10));
        assert_eq!(outcome.delta, 50);
        assert_eq!(sim.state().current_date, date(2026, 3, 11));
        assert_eq!(sim.state().streak_count, 1);
        assert_eq!(sim.state().score, 50);

        // Reloading from the database gives the same state
        let reloaded = StreakSimulator::load(&db, "user-1", "Sam", date(2000, 1, 1)).await?;
        assert_eq!(reloaded.state(), sim.state());
        Ok(())
    }

    #[tokio::test]
    async fn test_streak_continuity_and_zero_record_on_failure() -> Result<()> {
        let db = setup_test_db().await?;
        let mut sim = StreakSimulator::load(&db, "user-1", "Sam", date(2026, 3, 1)).await?;

        for _ in 0..3 {
            sim.advance_day(&db, 0.0, 20).await?;
        }
        sim.advance_day(&db, 30.0, 20).await?;
        sim.advance_day(&db, 5.0, 20).await?;

        let history = get_streak_history(&db, "user-1", None).await?;
        let numbers: Vec<(NaiveDate, i32)> =
            history.iter().rev().map(|r| (r.date, r.streak_number)).collect();
        assert_eq!(
            numbers,
            vec![
                (date(2026, 3, 1), 1),
                (date(2026, 3, 2), 2),
                (date(2026, 3, 3), 3),
                (date(2026, 3, 4), 0),
                (date(2026, 3, 5), 1),
            ]
        );
        assert_eq!(current_streak(&db, "user-1").await?, 1);
        assert_eq!(best_streak(&db, "user-1").await?, 3);
        assert_eq!(get_streak_history(&db, "user-1", Some(2)).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_advance_with_allocations_uses_day_budget() -> Result<()> {
        let db = setup_test_db().await?;
        allocator::store_allocations(
            &db,
            "user-1",
            &[allocation("lunch", 30), allocation("dinner", 70)],
            &[
                event_at("lunch", date(2026, 3, 10), 12),
                event_at("dinner", date(2026, 3, 10), 19),
            ],
        )
        .await?;

        let mut sim = StreakSimulator::load(&db, "user-1", "Sam", date(2026, 3, 10)).await?;
        let outcome = sim.advance_with_allocations(&db, 75.0).await?;
        assert_eq!(outcome.budget_for_day, 100);
        assert_eq!(outcome.delta, 25);

        // No events on the 11th: any spend is a flat penalty
        let outcome = sim.advance_with_allocations(&db, 1.0).await?;
        assert_eq!(outcome.budget_for_day, 0);
        assert_eq!(outcome.delta, -50);
        assert_eq!(outcome.new_score, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_state() -> Result<()> {
        // No tables: every write fails
        let db = sea_orm::Database::connect("sqlite::memory:").await?;
        let mut sim = StreakSimulator::new(state(2, 120));

        let result = sim.advance_day(&db, 0.0, 50).await;
        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(sim.state(), &state(2, 120));
        Ok(())
    }

    #[tokio::test]
    async fn test_scored_day_cannot_be_rewritten() -> Result<()> {
        let db = setup_test_db().await?;
        let mut sim = StreakSimulator::load(&db, "user-1", "Sam", date(2026, 3, 10)).await?;
        let stale = sim.clone();
        sim.advance_day(&db, 0.0, 10).await?;

        // A second simulator still pointing at the 10th cannot overwrite its record
        let mut stale = stale;
        let result = stale.advance_day(&db, 500.0, 10).await;
        assert!(matches!(result, Err(Error::Persistence(_))));

        let history = get_streak_history(&db, "user-1", None).await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].streak_number, 1);
        let reloaded = StreakSimulator::load(&db, "user-1", "Sam", date(2026, 3, 10)).await?;
        assert_eq!(reloaded.state().score, 25);
        Ok(())
    }
}

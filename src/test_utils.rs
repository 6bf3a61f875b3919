//! Shared test utilities for `budget-streak`.
//!
//! This module provides common helper functions for setting up test databases
//! and building events, raw items, and allocations with sensible defaults.

#![allow(clippy::expect_used)]

use crate::{
    core::{
        allocator::BudgetAllocation,
        event::{CalendarEvent, RawCalendarItem, RawEventTime},
    },
    entities::user_profile,
    errors::Result,
};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Shorthand for a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

/// A one-hour event starting at `hour`:00 on `day`, titled after its id.
pub fn event_at(id: &str, day: NaiveDate, hour: u32) -> CalendarEvent {
    let start = day.and_time(NaiveTime::from_hms_opt(hour, 0, 0).expect("valid test hour"));
    CalendarEvent::new(id, id, "", start, start + Duration::hours(1), false)
        .expect("valid test event")
}

/// A one-hour event at 09:00 on `day`.
///
/// # Defaults
/// * title: same as `id`
/// * location: empty
pub fn event_on(id: &str, day: NaiveDate) -> CalendarEvent {
    event_at(id, day, 9)
}

/// An allocation for `event_id` titled after the event id.
pub fn allocation(event_id: &str, predicted_budget: i64) -> BudgetAllocation {
    BudgetAllocation {
        event_id: event_id.to_string(),
        title: event_id.to_string(),
        predicted_budget,
        reasoning: "test estimate".to_string(),
    }
}

/// A raw timed item as the calendar API would return it, with no end time.
pub fn raw_timed(id: &str, date_time: &str) -> RawCalendarItem {
    RawCalendarItem {
        id: id.to_string(),
        summary: Some(id.to_string()),
        start: Some(RawEventTime {
            date_time: Some(date_time.to_string()),
            date: None,
        }),
        ..Default::default()
    }
}

/// Inserts a profile with a given score.
///
/// # Defaults
/// * `display_name`: same as `user_id`
/// * `simulated_date`: 2026-03-01
/// * `streak_count`: 0
pub async fn create_test_profile(
    db: &DatabaseConnection,
    user_id: &str,
    score: i64,
) -> Result<user_profile::Model> {
    user_profile::ActiveModel {
        user_id: Set(user_id.to_string()),
        display_name: Set(user_id.to_string()),
        score: Set(score),
        simulated_date: Set(date(2026, 3, 1)),
        streak_count: Set(0),
        updated_at: Set(Utc::now().naive_utc()),
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

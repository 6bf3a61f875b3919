//! Service facade tying the calendar, the allocator, and the streak simulator together.
//!
//! This is the entry point a front-end calls. It owns the per-user locks: sync passes
//! for one user are exclusive (a second concurrent pass is rejected), while day advances
//! for one user queue behind each other.

use crate::{
    calendar::CalendarSource,
    config::BudgetConfig,
    core::{
        allocator::{self, BudgetAllocator},
        event::{self, RawCalendarItem},
        session::UserLocks,
        streak::{DayOutcome, StreakSimulator},
        sync::{self, SyncReport},
    },
    errors::Result,
};
use chrono::{Local, NaiveDate};
use sea_orm::DatabaseConnection;
use tracing::{info, instrument};

/// Budget and streak operations for many users over one database.
#[derive(Clone)]
pub struct BudgetService {
    db: DatabaseConnection,
    allocator: BudgetAllocator,
    budget: BudgetConfig,
    sync_locks: UserLocks,
    streak_locks: UserLocks,
}

impl BudgetService {
    /// Creates a service. `budget` supplies the monthly spendable cap.
    #[must_use]
    pub fn new(db: DatabaseConnection, allocator: BudgetAllocator, budget: BudgetConfig) -> Self {
        Self {
            db,
            allocator,
            budget,
            sync_locks: UserLocks::new(),
            streak_locks: UserLocks::new(),
        }
    }

    /// Underlying connection, for read-only queries.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Reconciles stored allocations with a fresh batch of raw calendar items.
    ///
    /// Invalid items are dropped with a warning. Only events without a stored
    /// allocation are sent to the allocator, and nothing is written unless the whole
    /// pass succeeds.
    ///
    /// # Errors
    /// `Error::SyncConflict` if a pass for `user_id` is already running; otherwise any
    /// allocator or persistence error.
    #[instrument(skip(self, raw_items), fields(items = raw_items.len()))]
    pub async fn sync_calendar(
        &self,
        user_id: &str,
        raw_items: &[RawCalendarItem],
        current_date: NaiveDate,
    ) -> Result<SyncReport> {
        let _guard = self.sync_locks.try_acquire(user_id)?;

        let live_events = event::normalize_batch(raw_items);
        sync::sync_allocations(
            &self.db,
            &self.allocator,
            user_id,
            &live_events,
            current_date,
            self.budget.max_spendable(),
        )
        .await
    }

    /// Fetches from `source` and runs [`Self::sync_calendar`] on the result.
    ///
    /// The fetch starts at the first of `current_date`'s month, so events that already
    /// passed this month stay live and keep their allocations.
    pub async fn sync_from_source(
        &self,
        source: &dyn CalendarSource,
        user_id: &str,
        current_date: NaiveDate,
        max_results: u32,
    ) -> Result<SyncReport> {
        let from = allocator::start_of_month(current_date);
        let raw_items = source.fetch_upcoming(from, max_results).await?;
        info!("Fetched {} items for {}", raw_items.len(), user_id);
        self.sync_calendar(user_id, &raw_items, current_date).await
    }

    /// Creates the user's profile starting at `start_date` if it does not exist yet.
    pub async fn start_profile(
        &self,
        user_id: &str,
        display_name: &str,
        start_date: NaiveDate,
    ) -> Result<StreakSimulator> {
        let _guard = self.streak_locks.acquire(user_id).await;
        StreakSimulator::load(&self.db, user_id, display_name, start_date).await
    }

    /// Scores the user's current simulated day against its stored allocations.
    ///
    /// Concurrent calls for the same user run one after another. A user without a
    /// profile starts today.
    #[instrument(skip(self, display_name))]
    pub async fn advance_day(
        &self,
        user_id: &str,
        display_name: &str,
        actual_spend: f64,
    ) -> Result<DayOutcome> {
        let _guard = self.streak_locks.acquire(user_id).await;

        let today = Local::now().date_naive();
        let mut simulator = StreakSimulator::load(&self.db, user_id, display_name, today).await?;
        simulator.advance_with_allocations(&self.db, actual_spend).await
    }
}

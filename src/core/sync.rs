//! Calendar sync reconciliation.
//!
//! [`reconcile`] is a pure diff between the allocations already stored and the events
//! the calendar currently reports. [`sync_allocations`] applies that diff: it asks the
//! allocator about new events only, then purges stale rows, moves rescheduled ones and
//! stores the new ones in a single database transaction. If anything fails before the commit, the stored
//! allocation map is exactly what it was.

use crate::{
    core::{
        allocator::{self, BudgetAllocation, BudgetAllocator},
        event::CalendarEvent,
    },
    entities::budget_allocation,
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, instrument};

/// Difference between stored allocations and the live calendar.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncDiff {
    /// Event ids whose allocations must be purged, ascending
    pub removed: Vec<String>,
    /// Live events that still need an allocation, in calendar order
    pub added: Vec<CalendarEvent>,
}

impl SyncDiff {
    /// True when the stored map already matches the calendar.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Diffs stored allocations against live events.
///
/// - `removed`: stored event ids no longer present among `live_events`
/// - `added`: live events with no stored allocation that start on or after
///   `current_date` (past events are never allocated retroactively)
///
/// A live id listed twice is reported once, carrying the later value.
/// The function has no side effects; identical inputs give identical output.
#[must_use]
pub fn reconcile(
    known: &BTreeMap<String, BudgetAllocation>,
    live_events: &[CalendarEvent],
    current_date: NaiveDate,
) -> SyncDiff {
    let live_ids: HashSet<&str> = live_events.iter().map(CalendarEvent::id).collect();

    // BTreeMap keys iterate in order, so `removed` comes out sorted
    let removed = known
        .keys()
        .filter(|id| !live_ids.contains(id.as_str()))
        .cloned()
        .collect();

    let mut added: Vec<CalendarEvent> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for event in live_events {
        if known.contains_key(event.id()) || event.start_date() < current_date {
            continue;
        }
        if let Some(&index) = positions.get(event.id()) {
            added[index] = event.clone();
        } else {
            positions.insert(event.id(), added.len());
            added.push(event.clone());
        }
    }

    SyncDiff { removed, added }
}

/// Stored allocations whose event is still live but now starts at another time or
/// carries another title. Returns the live version of each, in stored order.
#[must_use]
pub fn find_rescheduled(
    stored: &[budget_allocation::Model],
    live_events: &[CalendarEvent],
) -> Vec<CalendarEvent> {
    // Later duplicates win, as in `reconcile`
    let live: HashMap<&str, &CalendarEvent> =
        live_events.iter().map(|event| (event.id(), event)).collect();

    stored
        .iter()
        .filter_map(|model| {
            let event = live.get(model.event_id.as_str())?;
            (event.start_time() != model.event_start || event.title() != model.title)
                .then(|| (*event).clone())
        })
        .collect()
}

/// Outcome of one applied sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncReport {
    /// Event ids whose allocations were deleted
    pub removed: Vec<String>,
    /// Ids of new events found in the calendar
    pub added: Vec<String>,
    /// Ids of stored events moved to their new start time or title
    pub rescheduled: Vec<String>,
    /// Allocations stored during this pass
    pub allocations: Vec<BudgetAllocation>,
    /// Cap handed to the allocator for the new events
    pub max_spendable: i64,
}

/// Brings the stored allocations for `user_id` in line with `live_events`.
///
/// An event that kept its id but moved keeps its budget; only its start time and title
/// are updated. The cap for the new events is the monthly cap minus whatever is still
/// earmarked for this month once the removed events are discounted and the moved ones
/// are counted at their new dates, so the month-wide total never exceeds `monthly_cap`.
///
/// Callers must hold the user's sync guard; this function does not serialize passes.
///
/// # Errors
/// Any allocator or persistence error. Nothing is written unless every step succeeds.
#[instrument(skip(db, allocator, live_events), fields(live = live_events.len()))]
pub async fn sync_allocations(
    db: &DatabaseConnection,
    allocator: &BudgetAllocator,
    user_id: &str,
    live_events: &[CalendarEvent],
    current_date: NaiveDate,
    monthly_cap: i64,
) -> Result<SyncReport> {
    let stored = allocator::get_allocations_for_user(db, user_id).await?;
    let known: BTreeMap<String, BudgetAllocation> = stored
        .iter()
        .cloned()
        .map(|model| (model.event_id.clone(), BudgetAllocation::from(model)))
        .collect();
    let diff = reconcile(&known, live_events, current_date);
    let rescheduled = find_rescheduled(&stored, live_events);
    if diff.is_empty() && rescheduled.is_empty() {
        info!("Allocations already match the calendar");
        return Ok(SyncReport::default());
    }

    let earmarked = earmarked_after_sync(db, user_id, current_date, &diff, &rescheduled, &known)
        .await?;
    let max_spendable = allocator::remaining_spendable(monthly_cap, earmarked);

    // Collaborator call happens before any write
    let allocations = allocator
        .allocate(&diff.added, current_date, max_spendable)
        .await?;

    let txn = db.begin().await?;
    allocator::delete_allocations(&txn, user_id, &diff.removed).await?;
    allocator::reschedule_allocations(&txn, user_id, &rescheduled).await?;
    allocator::store_allocations(&txn, user_id, &allocations, &diff.added).await?;
    txn.commit().await?;

    info!(
        "Sync applied: {} removed, {} rescheduled, {} new events, {} allocations stored",
        diff.removed.len(),
        rescheduled.len(),
        diff.added.len(),
        allocations.len()
    );

    Ok(SyncReport {
        removed: diff.removed,
        added: diff.added.iter().map(|e| e.id().to_string()).collect(),
        rescheduled: rescheduled.iter().map(|e| e.id().to_string()).collect(),
        allocations,
        max_spendable,
    })
}

/// Budget earmarked for `current_date`'s month once the pass is applied: stored rows in
/// the month, minus removed and rescheduled ones, plus rescheduled ones landing in it.
async fn earmarked_after_sync(
    db: &DatabaseConnection,
    user_id: &str,
    current_date: NaiveDate,
    diff: &SyncDiff,
    rescheduled: &[CalendarEvent],
    known: &BTreeMap<String, BudgetAllocation>,
) -> Result<i64> {
    let mut excluded = diff.removed.clone();
    excluded.extend(rescheduled.iter().map(|e| e.id().to_string()));
    let kept = allocator::allocated_in_month(db, user_id, current_date, &excluded).await?;

    let (first, last) = (
        allocator::start_of_month(current_date),
        allocator::end_of_month(current_date),
    );
    let moved_in: i64 = rescheduled
        .iter()
        .filter(|e| (first..=last).contains(&e.start_date()))
        .filter_map(|e| known.get(e.id()))
        .map(|a| a.predicted_budget)
        .sum();
    Ok(kept.saturating_add(moved_in))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::Error;
    use crate::llm::MockBackend;
    use crate::test_utils::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn known(ids: &[&str]) -> BTreeMap<String, BudgetAllocation> {
        ids.iter()
            .map(|id| ((*id).to_string(), allocation(id, 10)))
            .collect()
    }

    fn ids(events: &[CalendarEvent]) -> Vec<&str> {
        events.iter().map(CalendarEvent::id).collect()
    }

    #[test]
    fn test_reconcile_finds_removed_and_added() {
        let today = date(2026, 3, 10);
        let live = vec![
            event_on("B", today),
            event_on("C", today),
            event_on("D", date(2026, 3, 12)),
        ];

        let diff = reconcile(&known(&["A", "B", "C"]), &live, today);
        assert_eq!(diff.removed, vec!["A".to_string()]);
        assert_eq!(ids(&diff.added), vec!["D"]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let today = date(2026, 3, 10);
        let stored = known(&["A", "Z", "M"]);
        let live = vec![event_on("M", today), event_on("N", date(2026, 3, 20))];

        let first = reconcile(&stored, &live, today);
        let second = reconcile(&stored, &live, today);
        assert_eq!(first, second);
        assert_eq!(first.removed, vec!["A".to_string(), "Z".to_string()]);
    }

    #[test]
    fn test_reconcile_skips_past_events() {
        let today = date(2026, 3, 10);
        let live = vec![event_on("yesterday", date(2026, 3, 9)), event_on("today", today)];

        let diff = reconcile(&BTreeMap::new(), &live, today);
        assert_eq!(ids(&diff.added), vec!["today"]);
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn test_reconcile_keeps_past_events_that_are_still_live() {
        let today = date(2026, 3, 10);
        let live = vec![event_on("A", date(2026, 3, 1))];

        let diff = reconcile(&known(&["A"]), &live, today);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_reconcile_dedupes_live_ids() {
        let today = date(2026, 3, 10);
        let live = vec![
            event_on("A", today),
            event_on("B", today),
            event_on("A", date(2026, 3, 15)),
        ];

        let diff = reconcile(&BTreeMap::new(), &live, today);
        assert_eq!(ids(&diff.added), vec!["A", "B"]);
        assert_eq!(diff.added[0].start_date(), date(2026, 3, 15));
    }

    #[tokio::test]
    async fn test_sync_allocates_only_new_events_and_purges_stale() -> Result<()> {
        let db = setup_test_db().await?;
        let today = date(2026, 3, 10);
        let stored_events = vec![event_on("A", today), event_on("B", date(2026, 3, 11))];
        allocator::store_allocations(
            &db,
            "user-1",
            &[allocation("A", 100), allocation("B", 50)],
            &stored_events,
        )
        .await?;

        // A was deleted from the calendar, C is new
        let live = vec![event_on("B", date(2026, 3, 11)), event_on("C", date(2026, 3, 14))];
        let backend = Arc::new(MockBackend::default().with_response(
            r#"[{"eventId":"C","title":"C","predictedBudget":200,"reasoning":"concert"}]"#,
        ));
        let allocator = BudgetAllocator::new(backend.clone(), Duration::from_secs(5));

        let report = sync_allocations(&db, &allocator, "user-1", &live, today, 1000).await?;
        assert_eq!(report.removed, vec!["A".to_string()]);
        assert_eq!(report.added, vec!["C".to_string()]);
        // A's 100 no longer counts against the cap, B's 50 does
        assert_eq!(report.max_spendable, 950);

        let map = allocator::get_allocation_map(&db, "user-1").await?;
        let stored: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(stored, vec!["B", "C"]);
        assert_eq!(map["B"].predicted_budget, 50);
        assert_eq!(map["C"].predicted_budget, 200);

        // Second pass with the same calendar is a no-op and makes no collaborator call
        let again = sync_allocations(&db, &allocator, "user-1", &live, today, 1000).await?;
        assert_eq!(again, SyncReport::default());
        assert_eq!(backend.call_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_failure_leaves_map_unchanged() -> Result<()> {
        let db = setup_test_db().await?;
        let today = date(2026, 3, 10);
        let stored_events = vec![event_on("A", today)];
        allocator::store_allocations(&db, "user-1", &[allocation("A", 100)], &stored_events)
            .await?;

        let live = vec![event_on("C", date(2026, 3, 14))];
        let backend = MockBackend::default().with_response("I think C will cost about $20.");
        let allocator = BudgetAllocator::new(Arc::new(backend), Duration::from_secs(5));

        let result = sync_allocations(&db, &allocator, "user-1", &live, today, 1000).await;
        assert!(matches!(result, Err(Error::MalformedResponse { .. })));

        // A was not purged even though it is gone from the calendar
        let map = allocator::get_allocation_map(&db, "user-1").await?;
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["A"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_timeout_leaves_map_unchanged() -> Result<()> {
        let db = setup_test_db().await?;
        let today = date(2026, 3, 10);
        let live = vec![event_on("C", today)];
        let backend = MockBackend::default().with_delay(Duration::from_millis(200));
        let allocator = BudgetAllocator::new(Arc::new(backend), Duration::from_millis(10));

        let result = sync_allocations(&db, &allocator, "user-1", &live, today, 1000).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert!(allocator::get_allocation_map(&db, "user-1").await?.is_empty());
        Ok(())
    }

    #[test]
    fn test_find_rescheduled_compares_start_and_title() {
        let stored_on = |id: &str, day| budget_allocation::Model {
            user_id: "user-1".to_string(),
            event_id: id.to_string(),
            title: id.to_string(),
            predicted_budget: 10,
            reasoning: String::new(),
            event_start: event_on(id, day).start_time(),
            created_at: day.and_time(chrono::NaiveTime::MIN),
        };
        let stored = vec![
            stored_on("same", date(2026, 3, 10)),
            stored_on("moved", date(2026, 3, 11)),
            stored_on("renamed", date(2026, 3, 12)),
            stored_on("gone", date(2026, 3, 13)),
        ];
        let renamed = event_on("renamed", date(2026, 3, 12));
        let renamed = CalendarEvent::new(
            "renamed",
            "Team dinner",
            "",
            renamed.start_time(),
            renamed.end_time(),
            false,
        )
        .unwrap();
        let live = vec![
            event_on("same", date(2026, 3, 10)),
            event_on("moved", date(2026, 3, 20)),
            renamed,
            event_on("new", date(2026, 3, 14)),
        ];

        let found = find_rescheduled(&stored, &live);
        assert_eq!(ids(&found), vec!["moved", "renamed"]);
        assert_eq!(found[0].start_date(), date(2026, 3, 20));
        assert_eq!(found[1].title(), "Team dinner");
    }

    #[tokio::test]
    async fn test_sync_moves_rescheduled_event_without_reallocating() -> Result<()> {
        let db = setup_test_db().await?;
        let today = date(2026, 3, 10);
        allocator::store_allocations(
            &db,
            "user-1",
            &[allocation("dinner", 80)],
            &[event_on("dinner", date(2026, 3, 12))],
        )
        .await?;

        let backend = Arc::new(MockBackend::default());
        let allocator = BudgetAllocator::new(backend.clone(), Duration::from_secs(5));

        // Same id, new day
        let live = vec![event_on("dinner", date(2026, 3, 20))];
        let report = sync_allocations(&db, &allocator, "user-1", &live, today, 1000).await?;
        assert_eq!(report.rescheduled, vec!["dinner".to_string()]);
        assert!(report.removed.is_empty());
        assert!(report.added.is_empty());
        assert_eq!(backend.call_count(), 0);

        assert_eq!(allocator::budget_for_day(&db, "user-1", date(2026, 3, 12)).await?, 0);
        assert_eq!(allocator::budget_for_day(&db, "user-1", date(2026, 3, 20)).await?, 80);
        assert_eq!(
            allocator::get_allocation_map(&db, "user-1").await?["dinner"].predicted_budget,
            80
        );

        // Settled: the next pass has nothing to do
        let again = sync_allocations(&db, &allocator, "user-1", &live, today, 1000).await?;
        assert_eq!(again, SyncReport::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_counts_rescheduled_events_at_their_new_month() -> Result<()> {
        let db = setup_test_db().await?;
        let today = date(2026, 3, 10);
        allocator::store_allocations(
            &db,
            "user-1",
            &[allocation("dinner", 80), allocation("trip", 300)],
            &[
                event_on("dinner", date(2026, 3, 12)),
                event_on("trip", date(2026, 4, 5)),
            ],
        )
        .await?;

        // Dinner moves out of March, the trip moves into it, lunch is new
        let live = vec![
            event_on("dinner", date(2026, 4, 2)),
            event_on("trip", date(2026, 3, 28)),
            event_on("lunch", date(2026, 3, 15)),
        ];
        let backend = Arc::new(MockBackend::default().with_response(
            r#"[{"eventId":"lunch","title":"lunch","predictedBudget":20,"reasoning":"cafe"}]"#,
        ));
        let allocator = BudgetAllocator::new(backend.clone(), Duration::from_secs(5));

        let report = sync_allocations(&db, &allocator, "user-1", &live, today, 1000).await?;
        assert_eq!(report.rescheduled, vec!["dinner".to_string(), "trip".to_string()]);
        assert_eq!(report.added, vec!["lunch".to_string()]);
        assert_eq!(report.max_spendable, 700);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(allocator::budget_for_day(&db, "user-1", date(2026, 3, 28)).await?, 300);
        assert_eq!(allocator::budget_for_day(&db, "user-1", date(2026, 4, 2)).await?, 80);
        Ok(())
    }

    #[tokio::test]
    async fn test_sync_removal_only_skips_collaborator() -> Result<()> {
        let db = setup_test_db().await?;
        let today = date(2026, 3, 10);
        allocator::store_allocations(
            &db,
            "user-1",
            &[allocation("A", 100)],
            &[event_on("A", today)],
        )
        .await?;

        let backend = Arc::new(MockBackend::default());
        let allocator = BudgetAllocator::new(backend.clone(), Duration::from_secs(5));

        let report = sync_allocations(&db, &allocator, "user-1", &[], today, 1000).await?;
        assert_eq!(report.removed, vec!["A".to_string()]);
        assert!(report.allocations.is_empty());
        assert_eq!(backend.call_count(), 0);
        assert!(allocator::get_allocation_map(&db, "user-1").await?.is_empty());
        Ok(())
    }
}

//! Calendar sources.
//!
//! A source returns raw provider items; turning them into [`CalendarEvent`]s is done by
//! [`crate::core::event::normalize_batch`], so every source shares the same validation.
//!
//! [`CalendarEvent`]: crate::core::event::CalendarEvent

/// Google Calendar v3 source
pub mod google;

use crate::{
    core::event::{self, RawCalendarItem},
    errors::Result,
};
use async_trait::async_trait;
use chrono::NaiveDate;

pub use google::GoogleCalendarSource;

/// Something that can list upcoming calendar items.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Lists up to `max_results` items starting on or after `from`, earliest first.
    async fn fetch_upcoming(
        &self,
        from: NaiveDate,
        max_results: u32,
    ) -> Result<Vec<RawCalendarItem>>;
}

/// Source backed by a fixed list of items.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendarSource {
    items: Vec<RawCalendarItem>,
}

impl StaticCalendarSource {
    /// Serves `items` on every fetch, skipping those that start before the requested day.
    /// Items that do not parse are passed through for the caller's validation.
    #[must_use]
    pub const fn new(items: Vec<RawCalendarItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl CalendarSource for StaticCalendarSource {
    async fn fetch_upcoming(
        &self,
        from: NaiveDate,
        max_results: u32,
    ) -> Result<Vec<RawCalendarItem>> {
        let limit = usize::try_from(max_results)?;
        Ok(self
            .items
            .iter()
            .filter(|item| event::normalize(item).map_or(true, |e| e.start_date() >= from))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{date, raw_timed};

    #[tokio::test]
    async fn test_static_source_respects_limit() -> Result<()> {
        let source = StaticCalendarSource::new(vec![
            raw_timed("a", "2026-03-10T09:00:00Z"),
            raw_timed("b", "2026-03-11T09:00:00Z"),
            raw_timed("c", "2026-03-12T09:00:00Z"),
        ]);

        let items = source.fetch_upcoming(date(2026, 3, 1), 2).await?;
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_static_source_skips_items_before_from() -> Result<()> {
        let source = StaticCalendarSource::new(vec![
            raw_timed("february", "2026-02-27T09:00:00Z"),
            raw_timed("march", "2026-03-01T09:00:00Z"),
            raw_timed("broken", "not a time"),
        ]);

        let items = source.fetch_upcoming(date(2026, 3, 1), 10).await?;
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["march", "broken"]);
        Ok(())
    }
}

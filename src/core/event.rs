//! Calendar event normalization.
//!
//! Raw items from the calendar source are turned into [`CalendarEvent`] values. All
//! times are wall-clock (`NaiveDateTime`): an all-day date becomes local midnight of that
//! date, and a timed instant keeps the literal hour written in the string with any UTC
//! offset or `Z` suffix dropped. The result never depends on the process timezone.

use crate::errors::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Title used when the source item has no summary.
pub const UNTITLED_EVENT: &str = "Untitled Event";

/// Start or end of a raw item: either a timed instant or an all-day date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawEventTime {
    /// RFC 3339 instant, e.g. `2026-02-22T18:30:00-08:00`
    pub date_time: Option<String>,
    /// All-day date, e.g. `2026-02-22`
    pub date: Option<String>,
}

/// Organizer of a raw item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawOrganizer {
    /// Organizer e-mail address
    pub email: Option<String>,
}

/// One item as the calendar source returns it (Google Calendar `events` item shape).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCalendarItem {
    /// Stable external identifier
    pub id: String,
    /// Event title
    pub summary: Option<String>,
    /// Free-text description
    pub description: Option<String>,
    /// Free-text location
    pub location: Option<String>,
    /// When the event starts
    pub start: Option<RawEventTime>,
    /// When the event ends
    pub end: Option<RawEventTime>,
    /// Who organized it
    pub organizer: Option<RawOrganizer>,
}

/// Canonical calendar event.
///
/// Constructed only through [`normalize`] or [`CalendarEvent::new`], so `id` is never
/// empty and `start_time <= end_time` always holds. A changed source item produces a
/// new value under the same id; existing values are never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    id: String,
    title: String,
    location: String,
    start_time: NaiveDateTime,
    end_time: NaiveDateTime,
    is_all_day: bool,
    description: Option<String>,
    organizer: Option<String>,
}

/// Minimal projection of an event sent to the allocator.
///
/// Description and organizer are left out to keep the prompt small.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventProjection {
    /// Event id
    pub id: String,
    /// Event title
    pub title: String,
    /// Event location (may be empty)
    pub location: String,
    /// Wall-clock start
    pub start_time: NaiveDateTime,
    /// Wall-clock end
    pub end_time: NaiveDateTime,
    /// Whether the event spans whole days
    pub is_all_day: bool,
}

impl CalendarEvent {
    /// Builds an event directly, checking the id and time-ordering invariants.
    ///
    /// # Errors
    /// Returns `Error::Validation` if `id` is blank or `end_time < start_time`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        location: impl Into<String>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
        is_all_day: bool,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::Validation {
                message: "calendar item has no id".to_string(),
            });
        }
        if end_time < start_time {
            return Err(Error::Validation {
                message: format!("event {id} ends ({end_time}) before it starts ({start_time})"),
            });
        }

        Ok(Self {
            id,
            title: title.into(),
            location: location.into(),
            start_time,
            end_time,
            is_all_day,
            description: None,
            organizer: None,
        })
    }

    /// Attaches optional description and organizer.
    #[must_use]
    pub fn with_details(mut self, description: Option<String>, organizer: Option<String>) -> Self {
        self.description = description;
        self.organizer = organizer;
        self
    }

    /// Stable external identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Event title
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Event location (empty when unknown)
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Wall-clock start
    #[must_use]
    pub const fn start_time(&self) -> NaiveDateTime {
        self.start_time
    }

    /// Wall-clock end
    #[must_use]
    pub const fn end_time(&self) -> NaiveDateTime {
        self.end_time
    }

    /// Calendar day the event starts on
    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.start_time.date()
    }

    /// Whether the event spans whole days
    #[must_use]
    pub const fn is_all_day(&self) -> bool {
        self.is_all_day
    }

    /// Optional description
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Optional organizer e-mail
    #[must_use]
    pub fn organizer(&self) -> Option<&str> {
        self.organizer.as_deref()
    }

    /// Minimal projection sent to the allocator.
    #[must_use]
    pub fn to_prompt_payload(&self) -> EventProjection {
        EventProjection {
            id: self.id.clone(),
            title: self.title.clone(),
            location: self.location.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            is_all_day: self.is_all_day,
        }
    }
}

/// Drops a trailing `Z` or `±HH:MM` zone designator.
fn strip_zone_suffix(value: &str) -> &str {
    if let Some(stripped) = value.strip_suffix(['Z', 'z']) {
        return stripped;
    }

    let bytes = value.as_bytes();
    if bytes.len() > 6 {
        let suffix = &bytes[bytes.len() - 6..];
        let is_offset = matches!(suffix[0], b'+' | b'-')
            && suffix[1].is_ascii_digit()
            && suffix[2].is_ascii_digit()
            && suffix[3] == b':'
            && suffix[4].is_ascii_digit()
            && suffix[5].is_ascii_digit();
        if is_offset {
            return &value[..value.len() - 6];
        }
    }

    value
}

/// Parses a timed instant as wall-clock time, ignoring its zone.
fn parse_wall_clock(value: &str) -> Result<NaiveDateTime> {
    let local = strip_zone_suffix(value.trim());
    local
        .parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M"))
        .map_err(|e| Error::Validation {
            message: format!("invalid date-time '{value}': {e}"),
        })
}

/// Parses an all-day date as local midnight.
fn parse_all_day(value: &str) -> Result<NaiveDateTime> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN))
        .map_err(|e| Error::Validation {
            message: format!("invalid all-day date '{value}': {e}"),
        })
}

/// Resolves a raw start/end into a wall-clock instant and an all-day flag.
fn resolve_time(time: &RawEventTime) -> Option<Result<(NaiveDateTime, bool)>> {
    if let Some(date_time) = time.date_time.as_deref() {
        Some(parse_wall_clock(date_time).map(|t| (t, false)))
    } else {
        time.date
            .as_deref()
            .map(|date| parse_all_day(date).map(|t| (t, true)))
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

/// Normalizes one raw calendar item.
///
/// # Errors
/// Returns `Error::Validation` if the item has no id, lacks both a timed start and an
/// all-day date, carries an unparsable time, or ends before it starts.
pub fn normalize(item: &RawCalendarItem) -> Result<CalendarEvent> {
    let (start_time, is_all_day) = item
        .start
        .as_ref()
        .and_then(resolve_time)
        .ok_or_else(|| Error::Validation {
            message: format!("calendar item '{}' has neither a start time nor a date", item.id),
        })??;

    let end_time = match item.end.as_ref().and_then(resolve_time) {
        Some(end) => end?.0,
        None => start_time,
    };

    let title = non_empty(item.summary.as_ref()).unwrap_or_else(|| UNTITLED_EVENT.to_string());
    let location = item.location.clone().unwrap_or_default();
    let organizer = item
        .organizer
        .as_ref()
        .and_then(|o| non_empty(o.email.as_ref()));

    Ok(CalendarEvent::new(
        item.id.clone(),
        title,
        location,
        start_time,
        end_time,
        is_all_day,
    )?
    .with_details(non_empty(item.description.as_ref()), organizer))
}

/// Normalizes a batch, dropping (and logging) items that fail validation.
#[must_use]
pub fn normalize_batch(items: &[RawCalendarItem]) -> Vec<CalendarEvent> {
    items
        .iter()
        .filter_map(|item| match normalize(item) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(item_id = %item.id, "Dropping calendar item: {}", e);
                None
            }
        })
        .collect()
}

//! Google Calendar v3 source.
//!
//! Reads the primary calendar with recurring events expanded into single instances,
//! ordered by start time and bounded below by `timeMin`. Authentication is a caller-supplied OAuth access token;
//! obtaining and refreshing it happens outside this crate.

use super::CalendarSource;
use crate::{
    config::CalendarConfig,
    core::event::RawCalendarItem,
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveTime};
use reqwest::{Client, Request, StatusCode, header};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Calendar id queried by default.
const PRIMARY_CALENDAR: &str = "primary";

/// One page of the `events.list` response.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventsPage {
    items: Vec<RawCalendarItem>,
}

/// Google Calendar REST source.
pub struct GoogleCalendarSource {
    client: Client,
    base_url: String,
    access_token: String,
}

impl GoogleCalendarSource {
    /// Creates a source against `base_url` (normally `https://www.googleapis.com/calendar/v3`).
    ///
    /// # Errors
    /// `Error::Calendar` if the HTTP client cannot be built or the token is blank.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(Error::Calendar {
                message: "access token is empty".to_string(),
            });
        }

        let client = Client::builder().build().map_err(|e| Error::Calendar {
            message: format!("Failed to create HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// Creates a source from the `[calendar]` config section.
    ///
    /// # Errors
    /// Same as [`GoogleCalendarSource::new`].
    pub fn from_config(config: &CalendarConfig, access_token: impl Into<String>) -> Result<Self> {
        Self::new(config.base_url.clone(), access_token)
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/{PRIMARY_CALENDAR}/events", self.base_url)
    }

    fn events_request(&self, from: NaiveDate, max_results: u32) -> Result<Request> {
        self.client
            .get(self.events_url())
            .header(header::AUTHORIZATION, format!("Bearer {}", self.access_token))
            .query(&[
                ("orderBy", "startTime".to_string()),
                ("singleEvents", "true".to_string()),
                ("timeMin", time_min(from)),
                ("maxResults", max_results.to_string()),
            ])
            .build()
            .map_err(|e| Error::Calendar {
                message: format!("Failed to build request: {e}"),
            })
    }
}

/// RFC 3339 lower bound for `from`: midnight UTC of the day before, so events early on
/// `from` in any time zone east of UTC are still listed.
fn time_min(from: NaiveDate) -> String {
    from.checked_sub_days(Days::new(1))
        .unwrap_or(from)
        .and_time(NaiveTime::MIN)
        .and_utc()
        .to_rfc3339()
}

fn parse_events_page(body: &str) -> Result<Vec<RawCalendarItem>> {
    serde_json::from_str::<EventsPage>(body)
        .map(|page| page.items)
        .map_err(|e| Error::Calendar {
            message: format!("Unexpected events response: {e}"),
        })
}

#[async_trait]
impl CalendarSource for GoogleCalendarSource {
    #[instrument(skip(self))]
    async fn fetch_upcoming(
        &self,
        from: NaiveDate,
        max_results: u32,
    ) -> Result<Vec<RawCalendarItem>> {
        let request = self.events_request(from, max_results)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| Error::Calendar {
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Calendar {
            message: format!("Failed to read response: {e}"),
        })?;

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Calendar {
                message: "access token rejected (HTTP 401)".to_string(),
            });
        }
        if !status.is_success() {
            return Err(Error::Calendar {
                message: format!("HTTP {status}: {body}"),
            });
        }

        let items = parse_events_page(&body)?;
        debug!("Fetched {} calendar items", items.len());
        Ok(items)
    }
}

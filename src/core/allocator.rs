//! Budget allocation - Turns calendar events into per-event budgets under a hard cap.
//!
//! The per-event estimate itself comes from a language-model collaborator. This module
//! owns everything around that call: picking the events that belong to the rest of the
//! current month, building the request, and validating the reply before anything is
//! accepted. A reply is either taken whole or rejected whole; nothing is coerced.
//!
//! The persistence helpers at the bottom read and write the `budget_allocations` table.

use crate::{
    config::BudgetConfig,
    core::event::{CalendarEvent, EventProjection},
    entities::{BudgetAllocation as BudgetAllocationEntity, budget_allocation},
    errors::{Error, Result},
    llm::{CompletionRequest, LlmBackend},
};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SYSTEM_PROMPT: &str = "You are a deterministic financial allocation engine. \
Return only a JSON array, never prose or markdown.";

/// Predicted budget for one calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetAllocation {
    /// Id of the event this budget belongs to
    pub event_id: String,
    /// Event title, denormalized for display and audit
    pub title: String,
    /// Budget in whole currency units
    pub predicted_budget: i64,
    /// Collaborator's explanation; advisory only
    pub reasoning: String,
}

impl From<budget_allocation::Model> for BudgetAllocation {
    fn from(model: budget_allocation::Model) -> Self {
        Self {
            event_id: model.event_id,
            title: model.title,
            predicted_budget: model.predicted_budget,
            reasoning: model.reasoning,
        }
    }
}

/// Payload handed to the allocation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    /// Hard cap on the sum of all returned budgets
    pub max_spendable: i64,
    /// Day the allocation is made on
    pub current_date: NaiveDate,
    /// Events to budget
    pub events: Vec<EventProjection>,
    /// Monthly income, when known (context for the collaborator)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_income: Option<i64>,
    /// Monthly savings goal, when known (context for the collaborator)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings_goal: Option<i64>,
}

impl AllocationRequest {
    /// Renders the instruction text for the collaborator.
    ///
    /// # Errors
    /// Returns `Error::Serialization` if the event list cannot be encoded.
    pub fn to_prompt(&self) -> Result<String> {
        let events_json = serde_json::to_string_pretty(&self.events)?;
        let cap = self.max_spendable;

        let income_line = match (self.monthly_income, self.savings_goal) {
            (Some(income), Some(savings)) => format!(
                "The user earns ${income} per month and wants to save ${savings} per month.\n"
            ),
            _ => String::new(),
        };

        Ok(format!(
            "{income_line}The maximum spendable budget for the rest of the month is ${cap}.
The current date is {date}. Only events from today until the end of the month are listed.

EVENTS:
{events_json}

TASK:
For every event, predict a realistic dollar budget the user should allocate.

STRICT CONSTRAINTS:
1. The SUM of all predicted budgets MUST NOT exceed ${cap}.
2. If naive realistic estimates exceed the limit, scale all of them down proportionally. Never drop an event.
3. Routine or obligatory events (work meetings, study, gym, home activities) are low-cost unless the context strongly implies spending.
4. Discretionary events (dining, social, entertainment, travel, shopping) cost more.
5. Budget values must be non-negative integers.
6. Do NOT invent new events.
7. Every input event must have exactly one output object, using its id as eventId.

Return ONLY a valid JSON array, no markdown, no explanation. Each element must be:
{{ \"eventId\": \"...\", \"title\": \"...\", \"predictedBudget\": <integer>, \"reasoning\": \"...\" }}",
            date = self.current_date,
        ))
    }
}

/// Last day of the month `date` falls in.
#[must_use]
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next_first| next_first.pred_opt())
        .unwrap_or(date)
}

/// First day of the month `date` falls in.
#[must_use]
pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Events starting within `[current_date, end_of_month(current_date)]`.
#[must_use]
pub fn events_in_allocation_window(
    events: &[CalendarEvent],
    current_date: NaiveDate,
) -> Vec<&CalendarEvent> {
    let last_day = end_of_month(current_date);
    events
        .iter()
        .filter(|event| {
            let day = event.start_date();
            day >= current_date && day <= last_day
        })
        .collect()
}

/// One element of the collaborator's reply, exactly as it must appear.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAllocation {
    event_id: String,
    #[allow(dead_code)]
    title: String,
    predicted_budget: u64,
    reasoning: String,
}

fn malformed(reason: impl Into<String>, raw: &str) -> Error {
    Error::MalformedResponse {
        reason: reason.into(),
        raw: raw.to_string(),
    }
}

/// Removes one enclosing markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line
    body.split_once('\n').map_or(body, |(_, inner)| inner).trim()
}

/// Validates a collaborator reply against the events it was asked about.
///
/// On success the allocations come back in the order of `events`, with titles taken
/// from the events themselves.
///
/// # Errors
/// - `Error::MalformedResponse` if the text is not a JSON array of
///   `{eventId, title, predictedBudget, reasoning}` objects, a budget is not a
///   non-negative integer, or the ids do not match the input exactly once each
/// - `Error::ConstraintViolation` if the budgets sum above `max_spendable`
pub fn parse_allocation_response(
    raw: &str,
    events: &[&CalendarEvent],
    max_spendable: i64,
) -> Result<Vec<BudgetAllocation>> {
    let body = strip_code_fence(raw);
    let items: Vec<RawAllocation> = serde_json::from_str(body)
        .map_err(|e| malformed(format!("expected a JSON array of allocations: {e}"), raw))?;

    if items.len() != events.len() {
        return Err(malformed(
            format!(
                "expected {} allocations, got {}",
                events.len(),
                items.len()
            ),
            raw,
        ));
    }

    let expected: HashSet<&str> = events.iter().map(|e| e.id()).collect();
    let mut by_id: HashMap<String, RawAllocation> = HashMap::with_capacity(items.len());
    let mut total: i64 = 0;

    for item in items {
        if !expected.contains(item.event_id.as_str()) {
            return Err(malformed(
                format!("allocation for unknown event '{}'", item.event_id),
                raw,
            ));
        }
        let budget = i64::try_from(item.predicted_budget).map_err(|_| {
            malformed(
                format!("budget for '{}' is out of range", item.event_id),
                raw,
            )
        })?;
        total = total.saturating_add(budget);

        let event_id = item.event_id.clone();
        if by_id.insert(event_id.clone(), item).is_some() {
            return Err(malformed(
                format!("event '{event_id}' allocated more than once"),
                raw,
            ));
        }
    }

    if total > max_spendable {
        return Err(Error::ConstraintViolation {
            total,
            cap: max_spendable,
        });
    }

    events
        .iter()
        .map(|event| -> Result<BudgetAllocation> {
            let item = by_id
                .remove(event.id())
                .ok_or_else(|| malformed(format!("no allocation for '{}'", event.id()), raw))?;
            Ok(BudgetAllocation {
                event_id: item.event_id,
                title: event.title().to_string(),
                predicted_budget: i64::try_from(item.predicted_budget)?,
                reasoning: item.reasoning,
            })
        })
        .collect()
}

/// Drives the allocation collaborator and enforces its contract.
#[derive(Clone)]
pub struct BudgetAllocator {
    backend: Arc<dyn LlmBackend>,
    timeout: Duration,
    max_tokens: Option<u32>,
    budget: Option<BudgetConfig>,
}

impl BudgetAllocator {
    /// Creates an allocator that gives each collaborator call `timeout` to answer.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            max_tokens: None,
            budget: None,
        }
    }

    /// Adds income and savings figures to the request context.
    #[must_use]
    pub const fn with_budget_context(mut self, budget: BudgetConfig) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Caps the length of the collaborator's reply.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Builds the request for the events in the allocation window.
    #[must_use]
    pub fn build_request(
        &self,
        events: &[&CalendarEvent],
        current_date: NaiveDate,
        max_spendable: i64,
    ) -> AllocationRequest {
        AllocationRequest {
            max_spendable,
            current_date,
            events: events.iter().map(|e| e.to_prompt_payload()).collect(),
            monthly_income: self.budget.map(|b| b.monthly_income),
            savings_goal: self.budget.map(|b| b.savings_goal),
        }
    }

    /// Predicts a budget for every event starting between `current_date` and the end of
    /// its month, such that the budgets sum to at most `max_spendable`.
    ///
    /// Events outside the window are ignored. If none remain, no call is made and the
    /// result is empty.
    ///
    /// # Errors
    /// - `Error::Validation` if `max_spendable` is negative
    /// - `Error::Timeout` if the collaborator does not answer in time
    /// - `Error::Llm` on transport failure
    /// - `Error::MalformedResponse` / `Error::ConstraintViolation` if the reply breaks
    ///   the contract (see [`parse_allocation_response`])
    #[instrument(skip(self, events), fields(events = events.len(), model = self.backend.id()))]
    pub async fn allocate(
        &self,
        events: &[CalendarEvent],
        current_date: NaiveDate,
        max_spendable: i64,
    ) -> Result<Vec<BudgetAllocation>> {
        if max_spendable < 0 {
            return Err(Error::Validation {
                message: format!("max spendable must not be negative (got {max_spendable})"),
            });
        }

        let window = events_in_allocation_window(events, current_date);
        if window.is_empty() {
            debug!("No events in the allocation window, skipping collaborator call");
            return Ok(Vec::new());
        }

        let request = self.build_request(&window, current_date, max_spendable);
        let completion = CompletionRequest::user(request.to_prompt()?)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens);

        let raw = tokio::time::timeout(self.timeout, self.backend.complete(completion))
            .await
            .map_err(|_| Error::Timeout {
                seconds: self.timeout.as_secs(),
            })??;
        debug!(raw = %raw, "Allocation collaborator replied");

        let allocations = parse_allocation_response(&raw, &window, max_spendable)
            .inspect_err(|e| warn!("Rejected allocation response: {}", e))?;

        info!(
            "Allocated {} of {} across {} events",
            allocations.iter().map(|a| a.predicted_budget).sum::<i64>(),
            max_spendable,
            allocations.len()
        );
        Ok(allocations)
    }
}

/// Retrieves every stored allocation for a user, ordered by event start.
pub async fn get_allocations_for_user<C>(
    db: &C,
    user_id: &str,
) -> Result<Vec<budget_allocation::Model>>
where
    C: ConnectionTrait,
{
    BudgetAllocationEntity::find()
        .filter(budget_allocation::Column::UserId.eq(user_id))
        .order_by_asc(budget_allocation::Column::EventStart)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Stored allocations for a user keyed by event id.
pub async fn get_allocation_map<C>(
    db: &C,
    user_id: &str,
) -> Result<BTreeMap<String, BudgetAllocation>>
where
    C: ConnectionTrait,
{
    Ok(get_allocations_for_user(db, user_id)
        .await?
        .into_iter()
        .map(|model| (model.event_id.clone(), BudgetAllocation::from(model)))
        .collect())
}

fn day_bounds(first: NaiveDate, last: NaiveDate) -> (NaiveDateTime, Option<NaiveDateTime>) {
    (
        first.and_time(NaiveTime::MIN),
        last.succ_opt().map(|next| next.and_time(NaiveTime::MIN)),
    )
}

async fn allocations_between<C>(
    db: &C,
    user_id: &str,
    first: NaiveDate,
    last: NaiveDate,
) -> Result<Vec<budget_allocation::Model>>
where
    C: ConnectionTrait,
{
    let (from, until) = day_bounds(first, last);
    let mut query = BudgetAllocationEntity::find()
        .filter(budget_allocation::Column::UserId.eq(user_id))
        .filter(budget_allocation::Column::EventStart.gte(from));
    if let Some(until) = until {
        query = query.filter(budget_allocation::Column::EventStart.lt(until));
    }
    query.all(db).await.map_err(Into::into)
}

/// Sum of budgets for events starting on `date` (zero when there are none).
pub async fn budget_for_day<C>(db: &C, user_id: &str, date: NaiveDate) -> Result<i64>
where
    C: ConnectionTrait,
{
    Ok(allocations_between(db, user_id, date, date)
        .await?
        .iter()
        .map(|a| a.predicted_budget)
        .sum())
}

/// Sum of budgets already earmarked for events in `date`'s month, ignoring `excluded`
/// event ids.
pub async fn allocated_in_month<C>(
    db: &C,
    user_id: &str,
    date: NaiveDate,
    excluded: &[String],
) -> Result<i64>
where
    C: ConnectionTrait,
{
    let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
    Ok(
        allocations_between(db, user_id, start_of_month(date), end_of_month(date))
            .await?
            .iter()
            .filter(|a| !excluded.contains(a.event_id.as_str()))
            .map(|a| a.predicted_budget)
            .sum(),
    )
}

/// What is left of the monthly cap after `already_allocated`, floored at zero.
#[must_use]
pub const fn remaining_spendable(monthly_cap: i64, already_allocated: i64) -> i64 {
    let remaining = monthly_cap.saturating_sub(already_allocated);
    if remaining < 0 { 0 } else { remaining }
}

/// Inserts accepted allocations. Each allocation's event must be in `events`.
///
/// Existing rows are never overwritten: inserting an allocation for an event that is
/// already stored fails on the primary key.
pub async fn store_allocations<C>(
    db: &C,
    user_id: &str,
    allocations: &[BudgetAllocation],
    events: &[CalendarEvent],
) -> Result<u64>
where
    C: ConnectionTrait,
{
    if allocations.is_empty() {
        return Ok(0);
    }

    let starts: HashMap<&str, NaiveDateTime> =
        events.iter().map(|e| (e.id(), e.start_time())).collect();
    let now = Utc::now().naive_utc();

    let models = allocations
        .iter()
        .map(|allocation| -> Result<budget_allocation::ActiveModel> {
            let event_start = starts
                .get(allocation.event_id.as_str())
                .copied()
                .ok_or_else(|| Error::Validation {
                    message: format!("no event for allocation '{}'", allocation.event_id),
                })?;
            Ok(budget_allocation::ActiveModel {
                user_id: Set(user_id.to_string()),
                event_id: Set(allocation.event_id.clone()),
                title: Set(allocation.title.clone()),
                predicted_budget: Set(allocation.predicted_budget),
                reasoning: Set(allocation.reasoning.clone()),
                event_start: Set(event_start),
                created_at: Set(now),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    BudgetAllocationEntity::insert_many(models)
        .exec_without_returning(db)
        .await
        .map_err(Into::into)
}

/// Moves stored allocations to the start time and title their events now carry.
/// The predicted budget is left as it is. Returns the number of rows updated.
pub async fn reschedule_allocations<C>(
    db: &C,
    user_id: &str,
    events: &[CalendarEvent],
) -> Result<u64>
where
    C: ConnectionTrait,
{
    for event in events {
        budget_allocation::ActiveModel {
            user_id: Set(user_id.to_string()),
            event_id: Set(event.id().to_string()),
            title: Set(event.title().to_string()),
            event_start: Set(event.start_time()),
            ..Default::default()
        }
        .update(db)
        .await?;
    }
    Ok(u64::try_from(events.len())?)
}

/// Deletes the allocations for `event_ids`. Returns the number of rows removed.
pub async fn delete_allocations<C>(db: &C, user_id: &str, event_ids: &[String]) -> Result<u64>
where
    C: ConnectionTrait,
{
    if event_ids.is_empty() {
        return Ok(0);
    }

    let result = BudgetAllocationEntity::delete_many()
        .filter(budget_allocation::Column::UserId.eq(user_id))
        .filter(budget_allocation::Column::EventId.is_in(event_ids.iter().cloned()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

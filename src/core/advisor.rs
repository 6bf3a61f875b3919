//! Advisory chat over the user's own budget data.
//!
//! The advisor is informational only. It reads a snapshot of the user's goal, streak,
//! and allocations, and never writes anything back.

use crate::{
    core::{allocator, goal, streak},
    errors::{Error, Result},
    llm::{CompletionRequest, LlmBackend, Message},
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument};

/// Fixed reply for questions outside the user's own budget and calendar.
pub const REFUSAL_REPLY: &str =
    "I can only help with questions about your own budget, calendar events, streaks, and goals.";

/// Goal name shown when the user has no goal.
pub const NO_GOAL: &str = "None";

/// Who said a line of the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatSender {
    /// The user
    User,
    /// The advisor
    Advisor,
}

/// One line of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// Who said it
    pub sender: ChatSender,
    /// What was said
    pub text: String,
}

impl ChatTurn {
    /// A line from the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: ChatSender::User,
            text: text.into(),
        }
    }

    /// A line from the advisor.
    pub fn advisor(text: impl Into<String>) -> Self {
        Self {
            sender: ChatSender::Advisor,
            text: text.into(),
        }
    }
}

/// Goal as the advisor sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSnapshot {
    /// Goal name, or [`NO_GOAL`]
    pub name: String,
    /// Target amount
    pub total_cost: f64,
    /// Saved so far
    pub saved: f64,
    /// Stored status text
    pub status: String,
}

impl Default for GoalSnapshot {
    fn default() -> Self {
        Self {
            name: NO_GOAL.to_string(),
            total_cost: 0.0,
            saved: 0.0,
            status: goal::GoalStatus::Active.as_str().to_string(),
        }
    }
}

/// One allocation as the advisor sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    /// Event title
    pub title: String,
    /// Budget set aside for it
    pub predicted_budget: i64,
    /// Why that budget was chosen
    pub reasoning: String,
}

/// Read-only snapshot handed to the advisor.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisorContext {
    /// Latest goal
    pub goal: GoalSnapshot,
    /// Streak on the most recently recorded day
    pub current_streak: i32,
    /// Stored allocations
    pub events: Vec<EventSnapshot>,
}

/// Loads the advisor snapshot for a user.
pub async fn load_advisor_context(db: &DatabaseConnection, user_id: &str) -> Result<AdvisorContext> {
    let goal = goal::get_latest_goal(db, user_id)
        .await?
        .map(|g| GoalSnapshot {
            name: g.name,
            total_cost: g.target_amount,
            saved: g.current_amount,
            status: g.status,
        })
        .unwrap_or_default();

    let events = allocator::get_allocations_for_user(db, user_id)
        .await?
        .into_iter()
        .map(|a| EventSnapshot {
            title: a.title,
            predicted_budget: a.predicted_budget,
            reasoning: a.reasoning,
        })
        .collect();

    Ok(AdvisorContext {
        goal,
        current_streak: streak::current_streak(db, user_id).await?,
        events,
    })
}

fn system_prompt(context: &AdvisorContext) -> Result<String> {
    Ok(format!(
        "You are a personal budgeting advisor. Answer using only the user's data below: their \
savings goal, current streak of days within budget, and the budgets set aside for their \
calendar events. Be concise and concrete.\n\n\
If the user asks about anything unrelated to their own budget, calendar, streak, or goal, \
reply with exactly: {REFUSAL_REPLY}\n\n\
User data:\n{}",
        serde_json::to_string_pretty(context)?
    ))
}

/// Chat front-end over a language-model backend.
#[derive(Clone)]
pub struct Advisor {
    backend: Arc<dyn LlmBackend>,
    timeout: Duration,
}

impl Advisor {
    /// Creates an advisor that gives each reply `timeout` to arrive.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Answers the last user line of `history`.
    ///
    /// # Errors
    /// `Error::Validation` if the transcript is empty or its last user line is blank,
    /// `Error::Timeout` / `Error::Llm` if the backend fails.
    #[instrument(skip_all, fields(turns = history.len()))]
    pub async fn ask(&self, history: &[ChatTurn], context: &AdvisorContext) -> Result<String> {
        match history.last() {
            Some(turn) if turn.sender == ChatSender::User && !turn.text.trim().is_empty() => {}
            _ => {
                return Err(Error::Validation {
                    message: "advisor needs a non-empty user message".to_string(),
                });
            }
        }

        let mut request = CompletionRequest::default().with_system(system_prompt(context)?);
        for turn in history {
            let message = match turn.sender {
                ChatSender::User => Message::user(turn.text.trim()),
                ChatSender::Advisor => Message::assistant(turn.text.as_str()),
            };
            request = request.with_message(message);
        }

        let reply = tokio::time::timeout(self.timeout, self.backend.complete(request))
            .await
            .map_err(|_| Error::Timeout {
                seconds: self.timeout.as_secs(),
            })??;
        debug!(chars = reply.len(), "Advisor replied");

        Ok(reply.trim().to_string())
    }
}

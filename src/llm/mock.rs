//! Mock language-model backend.
//!
//! Replies from a queue of scripted responses (the last one repeats) and records every
//! request it receives, so tests can assert on the prompt that was sent.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::{CompletionRequest, LlmBackend, LlmError};

/// Scripted reply
#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Mock backend for testing.
pub struct MockBackend {
    model_id: String,
    replies: Mutex<VecDeque<Reply>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
    call_count: AtomicU32,
}

impl MockBackend {
    /// Create a mock that answers every request with `"[]"`.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            replies: Mutex::new(VecDeque::from([Reply::Text("[]".to_string())])),
            delay: None,
            requests: Mutex::new(Vec::new()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Replace the script with a single response.
    #[must_use]
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.set_replies(vec![Reply::Text(content.into())]);
        self
    }

    /// Replace the script with a sequence of responses, one per call.
    #[must_use]
    pub fn with_responses<I, S>(self, contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_replies(contents.into_iter().map(|c| Reply::Text(c.into())).collect());
        self
    }

    /// Make every call fail with a request error.
    #[must_use]
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.set_replies(vec![Reply::Fail(message.into())]);
        self
    }

    /// Sleep before answering (used to exercise timeouts).
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `complete` was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Copies of every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn set_replies(&self, replies: Vec<Reply>) {
        if let Ok(mut guard) = self.replies.lock() {
            *guard = replies.into();
        }
    }

    fn next_reply(&self) -> Reply {
        let Ok(mut guard) = self.replies.lock() else {
            return Reply::Fail("mock script poisoned".to_string());
        };
        if guard.len() > 1 {
            guard
                .pop_front()
                .unwrap_or_else(|| Reply::Text(String::new()))
        } else {
            guard
                .front()
                .cloned()
                .unwrap_or_else(|| Reply::Text(String::new()))
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply() {
            Reply::Text(text) => Ok(text),
            Reply::Fail(message) => Err(LlmError::RequestFailed(message)),
        }
    }
}

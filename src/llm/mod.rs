//! Language-model collaborators.
//!
//! The allocator and the advisor only see the [`LlmBackend`] trait: a prompt goes in,
//! text comes out. What the text must look like is checked by the caller, never here.

/// Scripted backend for tests and offline runs
pub mod mock;
/// OpenAI-compatible chat-completions backend (OpenRouter, Ollama, vLLM, ...)
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use mock::MockBackend;
pub use openai::OpenAiBackend;

/// Transport-level failures of a language-model backend.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Backend is not reachable or not configured
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with a non-success status
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Rate limited by the backend
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited {
        /// Suggested wait, if the backend sent one
        retry_after_ms: Option<u64>,
    },

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The envelope around the completion could not be decoded
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions to the model
    System,
    /// The human side of the conversation
    User,
    /// The model's earlier replies
    Assistant,
}

impl MessageRole {
    /// Wire name used by chat-completions APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request for a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System prompt (optional)
    pub system_prompt: Option<String>,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Create a new request with a single user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(content)],
            ..Default::default()
        }
    }

    /// Add a system prompt.
    #[must_use]
    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Add a message.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Set max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max: Option<u32>) -> Self {
        self.max_tokens = max;
        self
    }
}

/// Core trait for language-model backends.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Backend identifier (usually the model name).
    fn id(&self) -> &str;

    /// Generate a completion and return its text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::prompt::SystemPrompt;

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Request to an LLM backend.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    /// Plain text system prompt (used by the CLI backend).
    pub system: String,
    /// Two-block prompt with a cache breakpoint (API backend only).
    pub system_prompt: Option<SystemPrompt>,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    /// Tools to expose. Empty by default; the CLI backend rejects non-empty.
    pub tools: Vec<ToolDefinition>,
    /// Raw JSON messages for the tool loop (overrides `messages` when set):
    /// structured tool_use / tool_result / image blocks can't be represented
    /// as plain strings.
    pub raw_messages: Option<Vec<serde_json::Value>>,
}

impl ChatRequest {
    /// Plain single-turn request.
    pub fn plain(model: &str, system: &str, user: &str) -> Self {
        Self {
            model: model.to_string(),
            system: system.to_string(),
            system_prompt: None,
            messages: vec![Message {
                role: Role::User,
                content: user.to_string(),
            }],
            max_tokens: 4096,
            tools: Vec::new(),
            raw_messages: None,
        }
    }
}

/// Response from an LLM backend.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
    /// Tool calls requested by the LLM, in emission order.
    pub tool_calls: Vec<ToolCall>,
}

/// Common interface for the API and CLI backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Backend name for logging and error messages.
    fn name(&self) -> &str;

    /// Whether tool-use requests are supported.
    fn supports_tools(&self) -> bool;

    /// Send a request and wait for the full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl From<ProviderError> for adjutant_core::AdjutantError {
    fn from(e: ProviderError) -> Self {
        adjutant_core::AdjutantError::Llm(e.to_string())
    }
}

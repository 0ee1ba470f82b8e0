//! LLM access: two interchangeable backends behind one trait, a retrying
//! router with cross-backend fallback, and the cacheable system prompt shape.

pub mod anthropic;
pub mod claude_cli;
pub mod json;
pub mod prompt;
pub mod provider;
pub mod router;

pub use prompt::SystemPrompt;
pub use provider::{
    ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, ToolCall,
    ToolDefinition,
};
pub use router::{LlmRouter, ModelTier};

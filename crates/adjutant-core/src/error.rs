use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdjutantError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("LLM provider error: {0}")]
    Llm(String),

    #[error("Upstream transport error: {0}")]
    Transport(String),

    #[error("Bot error: {0}")]
    Bot(String),

    #[error("Task not found: #{id}")]
    TaskNotFound { id: i64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AdjutantError>;

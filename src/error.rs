//! Error types for the finance assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Pipeline Errors
    // =============================

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Max iterations reached: {0}")]
    MaxIterations(usize),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssistantError {
    /// Whether the error came from a remote call that failed to complete
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AssistantError::Transport(_) | AssistantError::Timeout(_) | AssistantError::Http(_)
        )
    }
}

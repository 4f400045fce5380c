use thiserror::Error;

/// Tracking agent error types
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        AgentError::StorageError(e.to_string())
    }
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

use jni::JNIEnv;
use thiserror::Error;
use waypoint_agent::AgentError;

/// JNI bridge error types
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("Agent not initialized")]
    NotInitialized,

    #[error("Agent already initialized")]
    AlreadyInitialized,

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("JNI error: {0}")]
    JniError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AgentError> for BridgeError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::InvalidParameters(msg) => BridgeError::InvalidParameters(msg),
            AgentError::Serialization(msg) => BridgeError::InvalidParameters(msg),
            AgentError::StorageError(msg) => BridgeError::StorageError(msg),
            other => BridgeError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::InvalidParameters(format!("bad JSON: {}", e))
    }
}

impl From<jni::errors::Error> for BridgeError {
    fn from(e: jni::errors::Error) -> Self {
        BridgeError::JniError(e.to_string())
    }
}

/// Result type for JNI operations
pub type BridgeResult<T> = Result<T, BridgeError>;

pub fn exception_class(error: &BridgeError) -> &'static str {
    match error {
        BridgeError::NotInitialized | BridgeError::AlreadyInitialized => {
            "java/lang/IllegalStateException"
        }
        BridgeError::InvalidParameters(_) => "java/lang/IllegalArgumentException",
        BridgeError::StorageError(_) => "java/io/IOException",
        BridgeError::JniError(_) | BridgeError::Internal(_) => "java/lang/RuntimeException",
    }
}

/// Throw Java exception from Rust error
pub fn throw_java_exception(env: &mut JNIEnv, error: &BridgeError) -> BridgeResult<()> {
    let message = error.to_string();
    env.throw_new(exception_class(error), message)
        .map_err(|_| BridgeError::JniError("Failed to throw exception".to_string()))?;

    Ok(())
}

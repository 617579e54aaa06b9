use thiserror::Error;

/// Errors raised by the core building blocks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed input to a validated API. The operation is fully rejected,
    /// no partial effect is applied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl CoreError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        CoreError::InvalidArgument(msg.into())
    }
}

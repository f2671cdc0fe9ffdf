//! Error types for schemadrift.

use thiserror::Error;

/// The main error type for drift detection and migration operations.
#[derive(Debug, Error)]
pub enum DriftError {
    /// Failed to connect to a destination database. Fatal for the invocation.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement failed to execute.
    #[error("Execution error: {0}")]
    Execution(String),

    /// A batch transaction could not be opened, committed or rolled back.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The classification store rejected an operation.
    #[error("Store error: {0}")]
    Store(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriftError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Result type alias for drift operations.
pub type DriftResult<T> = Result<T, DriftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriftError::Connection("refused".into());
        assert_eq!(err.to_string(), "Connection error: refused");
        let err = DriftError::config("missing [environments.staging]");
        assert_eq!(
            err.to_string(),
            "Configuration error: missing [environments.staging]"
        );
    }
}

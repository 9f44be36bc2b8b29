use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Queue service errors (receive/delete/send)
    #[error("Queue error: {0}")]
    Queue(String),

    /// Record store / ledger errors
    #[error("Store error: {0}")]
    Store(String),

    /// Event bus publish/consume errors
    #[error("Bus error: {0}")]
    Bus(String),

    /// Object store errors
    #[error("Object store error: {0}")]
    ObjectStore(String),

    /// Alert topic errors
    #[error("Alert error: {0}")]
    Alert(String),

    /// Incident API errors
    #[error("Incident API error: {0}")]
    Incident(String),

    /// LLM API errors (invalid reply, transport failure)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Queue(_) => "QUEUE_ERROR",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Bus(_) => "BUS_ERROR",
            AppError::ObjectStore(_) => "OBJECT_STORE_ERROR",
            AppError::Alert(_) => "ALERT_ERROR",
            AppError::Incident(_) => "INCIDENT_ERROR",
            AppError::Llm(_) => "LLM_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the enclosing invocation should be retried by the bus
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Queue(_)
                | AppError::Store(_)
                | AppError::Bus(_)
                | AppError::ObjectStore(_)
                | AppError::Alert(_)
                | AppError::Incident(_)
                | AppError::Timeout(_)
        )
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Conversion from reqwest::Error
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else {
            AppError::Incident(err.to_string())
        }
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::Queue("test".to_string()).error_code(),
            "QUEUE_ERROR"
        );
        assert_eq!(
            AppError::Llm("bad reply".to_string()).error_code(),
            "LLM_ERROR"
        );
        assert_eq!(
            AppError::Timeout("llm call".to_string()).error_code(),
            "TIMEOUT"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::Bus("publish failed".to_string()).is_retryable());
        assert!(AppError::Incident("503".to_string()).is_retryable());
        assert!(!AppError::Validation("bad category".to_string()).is_retryable());
        assert!(!AppError::Configuration("missing key".to_string()).is_retryable());
    }
}

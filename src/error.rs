/// Centralized error types for the rate service
use thiserror::Error;

/// Coarse classification used by callers to map failures to responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParam,
    InvalidScript,
    InvalidAggregateParam,
    NotFound,
    Cancelled,
    Internal,
}

#[derive(Error, Debug)]
pub enum RatesError {
    // Validation Errors
    #[error("Invalid param: {0}")]
    InvalidParam(String),

    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Invalid aggregate param: {0}")]
    InvalidAggregateParam(String),

    // Lookup Errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    // Persistence Errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    // Network Errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Deserialization failed: {0}")]
    Decode(#[from] serde_json::Error),

    // File I/O Errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    // Generic Errors
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RatesError>;

impl RatesError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RatesError::InvalidParam(_) => ErrorKind::InvalidParam,
            RatesError::InvalidScript(_) => ErrorKind::InvalidScript,
            RatesError::InvalidAggregateParam(_) => ErrorKind::InvalidAggregateParam,
            RatesError::NotFound(_) => ErrorKind::NotFound,
            RatesError::Cancelled(_) => ErrorKind::Cancelled,
            RatesError::Database(_)
            | RatesError::Pool(_)
            | RatesError::Http(_)
            | RatesError::Decode(_)
            | RatesError::Io(_)
            | RatesError::Config(_)
            | RatesError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if the caller should answer "no data" instead of a server failure
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Get error code for logging/monitoring
    pub fn error_code(&self) -> &str {
        match self {
            RatesError::InvalidParam(_) => "PARAM_001",
            RatesError::InvalidScript(_) => "PARAM_002",
            RatesError::InvalidAggregateParam(_) => "PARAM_003",
            RatesError::NotFound(_) => "DATA_001",
            RatesError::Cancelled(_) => "SYS_001",
            RatesError::Database(_) => "DB_001",
            RatesError::Pool(_) => "DB_002",
            RatesError::Http(_) => "NET_001",
            RatesError::Decode(_) => "NET_002",
            RatesError::Io(_) => "FILE_001",
            RatesError::Config(_) => "CFG_001",
            RatesError::Internal(_) => "INT_001",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(RatesError::NotFound("ETH".to_string()).is_not_found());
        assert_eq!(
            RatesError::Config("bad".to_string()).kind(),
            ErrorKind::Internal
        );
        assert_eq!(
            RatesError::InvalidAggregateParam("median".to_string()).kind(),
            ErrorKind::InvalidAggregateParam
        );
        assert!(!RatesError::Internal("boom".to_string()).is_not_found());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(RatesError::Cancelled("deadline".to_string()).error_code(), "SYS_001");
        assert_eq!(RatesError::InvalidParam("x".to_string()).error_code(), "PARAM_001");
    }
}

use std::fmt;
use serde::{Deserialize, Serialize};

/// Main error type for orderflow
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Database errors (SQLx wrapped)
    Database(sqlx::Error),

    /// Cache errors
    Cache(String),

    /// Event bus errors
    Bus(String),

    /// Authentication/Authorization errors
    Unauthorized(String),

    /// Validation errors
    Validation(String),

    /// Not found errors
    NotFound(String),

    /// Illegal state transition or conflicting write
    Conflict(String),

    /// One or more items could not be reserved
    InsufficientStock(Vec<FailedItem>),

    /// Gateway returned a non-retryable negative result
    PaymentDeclined(String),

    /// Outbound call exceeded its deadline
    Timeout(String),

    /// Serialization/deserialization errors
    Serialization(serde_json::Error),

    /// IO errors
    Io(std::io::Error),

    /// Generic errors with description
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Per-item reservation failure detail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedItem {
    pub sku_id: uuid::Uuid,
    pub requested: i32,
    pub reason: String,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Database(e) => write!(f, "Database error: {}", e),
            Error::Cache(msg) => write!(f, "Cache error: {}", msg),
            Error::Bus(msg) => write!(f, "Event bus error: {}", msg),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::InsufficientStock(items) => {
                write!(f, "Insufficient stock for {} item(s)", items.len())
            }
            Error::PaymentDeclined(msg) => write!(f, "Payment declined: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Error::Database(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(error: redis::RedisError) -> Self {
        Error::Cache(error.to_string())
    }
}

impl From<rdkafka::error::KafkaError> for Error {
    fn from(error: rdkafka::error::KafkaError) -> Self {
        Error::Bus(error.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::Validation(format!("Invalid UUID: {}", error))
    }
}

// Common error constructors
impl Error {
    /// Create a new configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new conflict error
    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        Error::Conflict(msg.into())
    }

    /// Create a new unauthorized error
    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        Error::Unauthorized(msg.into())
    }

    /// Create a new cache error
    pub fn cache<T: Into<String>>(msg: T) -> Self {
        Error::Cache(msg.into())
    }

    /// Create a new event bus error
    pub fn bus<T: Into<String>>(msg: T) -> Self {
        Error::Bus(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        Error::Timeout(msg.into())
    }
}

impl Error {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized(_) => 401,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 400,
            Error::InsufficientStock(_) => 400,
            Error::NotFound(_) => 404,
            Error::PaymentDeclined(_) => 402,
            Error::Bus(_) => 503,
            Error::Timeout(_) => 503,
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Cache(_) => 500,
            Error::Serialization(_) => 500,
            Error::Io(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Get error category for monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Cache(_) => "cache",
            Error::Bus(_) => "bus",
            Error::Unauthorized(_) => "auth",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::InsufficientStock(_) => "insufficient_stock",
            Error::PaymentDeclined(_) => "payment_declined",
            Error::Timeout(_) => "timeout",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }

    /// Whether a retry with backoff is worthwhile
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Cache(_) | Error::Bus(_) | Error::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::validation("bad input").status_code(), 400);
        assert_eq!(Error::unauthorized("no token").status_code(), 401);
        assert_eq!(Error::not_found("order").status_code(), 404);
        assert_eq!(Error::PaymentDeclined("card declined".into()).status_code(), 402);
        assert_eq!(Error::InsufficientStock(vec![]).status_code(), 400);
        assert_eq!(Error::bus("broker down").status_code(), 503);
    }

    #[test]
    fn test_categories() {
        assert_eq!(Error::conflict("terminal state").category(), "conflict");
        assert_eq!(Error::timeout("gateway").category(), "timeout");
        assert_eq!(Error::InsufficientStock(vec![]).category(), "insufficient_stock");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::bus("unavailable").is_transient());
        assert!(Error::timeout("deadline").is_transient());
        assert!(!Error::validation("bad").is_transient());
        assert!(!Error::PaymentDeclined("declined".into()).is_transient());
    }
}

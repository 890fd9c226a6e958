use std::fmt;

use serde::{Deserialize, Serialize};

/// Main error type for rebill
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Database errors (SQLx wrapped)
    Database(sqlx::Error),

    /// Validation errors
    Validation(String),

    /// Not found errors (also returned for cross-tenant reads)
    NotFound(String),

    /// Uniqueness conflicts and unmet preconditions
    Conflict(String),

    /// Idempotency-Key replayed with a different request payload
    IdempotencyConflict(String),

    /// Authentication failures (webhook signatures, upstream auth)
    Unauthorized(String),

    /// Tenant mismatch between authenticated identity and requested app
    Forbidden(String),

    /// Payment processor failures, carrying the PSP's own code and message
    PaymentProcessor { code: String, message: String },

    /// Outbound PSP concurrency limit exhausted
    Backpressure,

    /// Serialization errors
    Serialization(serde_json::Error),

    /// Generic internal errors
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Database(e) => write!(f, "Database error: {}", e),
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::IdempotencyConflict(msg) => write!(f, "Idempotency conflict: {}", msg),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            Error::PaymentProcessor { code, message } => {
                write!(f, "Payment processor error [{}]: {}", code, message)
            }
            Error::Backpressure => write!(f, "Too many concurrent payment operations"),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(e) => Some(e),
            Error::Serialization(e) => Some(e),
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

    /// Create a new idempotency conflict error
    pub fn idempotency_conflict<T: Into<String>>(msg: T) -> Self {
        Error::IdempotencyConflict(msg.into())
    }

    /// Create a new unauthorized error
    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        Error::Unauthorized(msg.into())
    }

    /// Create a new forbidden error
    pub fn forbidden<T: Into<String>>(msg: T) -> Self {
        Error::Forbidden(msg.into())
    }

    /// Create a new payment processor error
    pub fn payment_processor<C: Into<String>, M: Into<String>>(code: C, message: M) -> Self {
        Error::PaymentProcessor {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        Error::Internal(msg.into())
    }
}

impl Error {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::IdempotencyConflict(_) => 409,
            Error::PaymentProcessor { .. } => 502,
            Error::Backpressure => 503,
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Serialization(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Get error category for monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::IdempotencyConflict(_) => "idempotency_conflict",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::PaymentProcessor { .. } => "payment_processor",
            Error::Backpressure => "backpressure",
            Error::Serialization(_) => "serialization",
            Error::Internal(_) => "internal",
        }
    }

    /// True when this wraps a Postgres unique-constraint violation (23505).
    ///
    /// Domain-idempotency call sites use this to recover from insert races:
    /// the loser re-reads the winner's row instead of failing the request.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            Error::Conflict(_) => true,
            _ => false,
        }
    }
}

/// Validation error struct for detailed field errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_error(self) -> Error {
        Error::Validation(
            serde_json::to_string(&self.errors)
                .unwrap_or_else(|_| "Validation failed".to_string()),
        )
    }
}

impl Default for ValidationErrors {
    fn default() -> Self {
        Self::new()
    }
}

//! Error types for farm-records

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Record is verified and locked: {0}")]
    Locked(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecordsError {
    /// Stable machine-readable kind, used by API clients to branch on errors
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Locked(_) => "locked",
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Database(_) => "database_error",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Config(_) => "config_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_) | Self::Conflict(_))
    }
}

impl From<rusqlite::Error> for RecordsError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Conflict(format!("database busy: {}", err))
            }
            // Raised by the lock triggers
            rusqlite::Error::SqliteFailure(ref e, Some(ref msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.ends_with("is verified") =>
            {
                Self::Locked(msg.clone())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

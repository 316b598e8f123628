use chrono::{DateTime, Utc};
use thiserror::Error;

use ct_core::ValidationError;
use ct_db::DbError;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad client input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A requested range whose start is not before its end.
    #[error("invalid range: {from} is not before {to}")]
    InvalidRange { from: DateTime<Utc>, to: DateTime<Utc> },

    /// A user or rule that does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Any persistence failure.
    #[error("storage error: {0}")]
    Store(DbError),

    /// The caller went away before the operation finished.
    #[error("operation cancelled")]
    Cancelled,

    /// A write that collided with existing state, such as a second summary
    /// for the same day.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        if err.is_constraint_violation() {
            Self::Conflict(err.to_string())
        } else {
            Self::Store(err)
        }
    }
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// HTTP status the error maps to at the request edge.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidRange { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Cancelled => 499,
            Self::Store(_) | Self::Conflict(_) => 500,
        }
    }
}

//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types and client input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A date or time string could not be parsed.
    #[error("invalid date for {field}: {value}")]
    InvalidDate { field: &'static str, value: String },

    /// The interval identifier is not known.
    #[error("unknown interval: {value}")]
    UnknownInterval { value: String },

    /// The entity type is not known.
    #[error("unknown entity type: {value}")]
    UnknownEntityType { value: String },

    /// The heartbeat type is not known.
    #[error("unknown heartbeat type: {value}")]
    UnknownHeartbeatType { value: String },

    /// The IANA time zone name is not known.
    #[error("unknown time zone: {value}")]
    UnknownTimeZone { value: String },

    /// A time range whose start is not before its end.
    #[error("invalid range: {from} is not before {to}")]
    InvalidRange { from: String, to: String },

    /// Retention settings must not be negative when explicitly given per user.
    #[error("retention must not be negative, got {value}")]
    NegativeRetention { value: i64 },

    /// A cron expression or legacy shorthand could not be parsed.
    #[error("invalid schedule expression {value}: {message}")]
    InvalidSchedule { value: String, message: String },

    /// A heartbeat field failed validation at ingestion.
    #[error("invalid heartbeat: {message}")]
    InvalidHeartbeat { message: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated user identifier.
    ///
    /// User IDs must be non-empty. Every persisted record is owned by exactly one user.
    UserId, "user ID"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_empty() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
        assert!(UserId::new("alice").is_ok());
    }

    #[test]
    fn user_id_serde_rejects_empty() {
        let result: Result<UserId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
        let parsed: UserId = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(parsed.as_str(), "bob");
    }

    #[test]
    fn user_ids_order_lexicographically() {
        let a = UserId::new("a").unwrap();
        let b = UserId::new("b").unwrap();
        assert!(a < b);
    }
}

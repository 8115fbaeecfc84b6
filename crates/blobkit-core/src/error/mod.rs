//! Error types and result aliases for blob store operations.
//!
//! Provides a unified error type that covers the blob store taxonomy
//! (not found, already exists, general failure) plus the programming and
//! configuration errors that are never retried.

use thiserror::Error;

/// Boxed error used as the cause of wrapped failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for all blob store operations
#[derive(Error, Debug)]
pub enum BlobError {
    /// The blob does not exist (missing file, HTTP 404)
    #[error("The blob {path} does not exist in this BlobStore")]
    NotFound {
        path: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A write collided with an existing blob while `fail_if_exists` was set
    #[error("The blob {path} already exists in this BlobStore")]
    AlreadyExists {
        path: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Any other backend-specific failure
    #[error("{message}")]
    General {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Misuse of the API, such as passing metadata from a different store
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // Config errors
    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("Missing required fields for {subject}: {}", fields.join(", "))]
    MissingFields { subject: String, fields: Vec<String> },
}

/// Result type alias for blob store operations
pub type BlobResult<T> = Result<T, BlobError>;

impl BlobError {
    /// Create a not-found error for a blob path
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create an already-exists error for a blob path
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists {
            path: path.into(),
            source: None,
        }
    }

    /// Create a general error wrapping any error type
    pub fn general<E>(message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::General {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a general error without an underlying cause
    pub fn message(message: impl Into<String>) -> Self {
        Self::General {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error from std::io::Error, mapping a missing file to `NotFound`
    pub fn io(path: impl Into<String>, message: impl Into<String>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.into(),
                source: Some(Box::new(source)),
            }
        } else {
            Self::General {
                message: message.into(),
                source: Some(Box::new(source)),
            }
        }
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Check if this error reports a missing blob
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobError::NotFound { .. })
    }

    /// Check if this error reports a write collision
    pub fn is_already_exists(&self) -> bool {
        matches!(self, BlobError::AlreadyExists { .. })
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            BlobError::NotFound { .. } => Some("Check the blob path and the selected store"),
            BlobError::AlreadyExists { .. } => {
                Some("Delete the existing blob first, or store without --fail-if-exists")
            },
            BlobError::TomlParse(_)
            | BlobError::ConfigValidation { .. }
            | BlobError::MissingFields { .. } => {
                Some("Review the store definition in blobkit.toml")
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let error = BlobError::io(
            "foo/bar",
            "Failed to open blob",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(error.is_not_found());
        assert_eq!(error.to_string(), "The blob foo/bar does not exist in this BlobStore");
        assert!(error.source().is_some());
    }

    #[test]
    fn test_io_other_maps_to_general() {
        let error = BlobError::io(
            "foo/bar",
            "Failed to open blob",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(error, BlobError::General { .. }));
        assert_eq!(error.to_string(), "Failed to open blob");
    }

    #[test]
    fn test_missing_fields_lists_every_field() {
        let error = BlobError::MissingFields {
            subject: "service account credentials".to_string(),
            fields: vec!["client_id".to_string(), "private_key".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Missing required fields for service account credentials: client_id, private_key"
        );
    }

    #[test]
    fn test_suggestions() {
        assert!(BlobError::not_found("a").suggestion().is_some());
        assert!(BlobError::already_exists("a").suggestion().is_some());
        assert!(BlobError::message("boom").suggestion().is_none());
    }
}

//! Error taxonomy for the list controller.
//!
//! # Design
//! - Backends report raw [`SourceError`] outcomes; the controller converts
//!   them into [`ControllerError`] before any shared state is touched.
//! - `ControllerError` is `Clone + PartialEq` so it can be stored inside
//!   [`crate::LoadingState::Failed`] and compared in tests.
//! - Messages are constant; context lives in the fields.

use thiserror::Error;

/// Result alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors surfaced by the controller to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// The request was superseded or the controller was torn down.
    #[error("request cancelled")]
    Cancelled,
    /// Transport failure, timeout, or unexpected server status.
    #[error("network request failed: {message}")]
    Network {
        /// Human-readable failure description preserved for display.
        message: String,
    },
    /// Input was rejected before (or by) the backend.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the rejected input.
        message: String,
    },
    /// The mutation target no longer exists server-side.
    #[error("conflicting server state: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },
    /// The list endpoint answered with a payload that could not be decoded.
    #[error("malformed list response: {message}")]
    Malformed {
        /// Decoder failure description.
        message: String,
    },
}

impl ControllerError {
    /// Build a validation error from any displayable message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Whether the error should be hidden from the user.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the presentation layer should offer a retry affordance.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Malformed { .. })
    }

    /// Stable machine-friendly discriminator for logs and events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Network { .. } => "network",
            Self::Validation { .. } => "validation",
            Self::Conflict { .. } => "conflict",
            Self::Malformed { .. } => "malformed",
        }
    }
}

/// Raw outcome reported by a [`crate::ListBackend`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The backend observed the cancellation signal and abandoned the call.
    #[error("backend call cancelled")]
    Cancelled,
    /// The backend did not answer within its own deadline.
    #[error("backend call timed out")]
    Timeout {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Transport-level failure or an unexpected status.
    #[error("backend transport failed")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Failure description.
        message: String,
    },
    /// The backend rejected the payload as invalid.
    #[error("backend rejected the request")]
    Rejected {
        /// Operation identifier.
        operation: &'static str,
        /// Rejection description.
        message: String,
    },
    /// The mutation target is gone or was changed concurrently.
    #[error("backend reported a conflict")]
    Conflict {
        /// Operation identifier.
        operation: &'static str,
        /// Conflict description.
        message: String,
    },
    /// The backend does not implement the operation.
    #[error("backend operation not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
}

impl From<SourceError> for ControllerError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::Cancelled => Self::Cancelled,
            SourceError::Timeout { operation } => Self::Network {
                message: format!("{operation} timed out"),
            },
            SourceError::Transport { operation, message } => Self::Network {
                message: format!("{operation}: {message}"),
            },
            SourceError::Rejected { message, .. } => Self::Validation { message },
            SourceError::Conflict { message, .. } => Self::Conflict { message },
            SourceError::Unsupported { operation } => Self::Network {
                message: format!("{operation} is not supported by this backend"),
            },
        }
    }
}

/// Errors raised while constructing a query codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A filter field collides with a reserved query parameter.
    #[error("filter field uses a reserved parameter name")]
    ReservedField {
        /// Offending field name.
        field: String,
    },
    /// A vocabulary entry was empty.
    #[error("vocabulary entries must not be empty")]
    EmptyField,
}

/// Errors raised when validating controller configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric field was outside its accepted range.
    #[error("configuration value out of range")]
    OutOfRange {
        /// Field identifier.
        field: &'static str,
        /// Constraint description.
        constraint: &'static str,
    },
    /// A string field was empty.
    #[error("configuration value must not be empty")]
    Empty {
        /// Field identifier.
        field: &'static str,
    },
    /// The configuration document could not be parsed.
    #[error("configuration document is invalid")]
    Parse {
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while rendering an export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The CSV writer failed.
    #[error("failed to write csv export")]
    Csv {
        /// Underlying csv error.
        #[source]
        source: csv::Error,
    },
    /// Flushing the CSV writer failed.
    #[error("failed to flush csv export")]
    Flush {
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The rendered export was not valid UTF-8.
    #[error("csv export was not valid utf-8")]
    Utf8 {
        /// Underlying conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_errors_map_onto_the_taxonomy() {
        assert_eq!(
            ControllerError::from(SourceError::Cancelled),
            ControllerError::Cancelled
        );
        assert!(matches!(
            ControllerError::from(SourceError::Timeout { operation: "list" }),
            ControllerError::Network { message } if message == "list timed out"
        ));
        assert!(matches!(
            ControllerError::from(SourceError::Rejected {
                operation: "create",
                message: "name required".into(),
            }),
            ControllerError::Validation { message } if message == "name required"
        ));
        assert!(matches!(
            ControllerError::from(SourceError::Conflict {
                operation: "delete",
                message: "gone".into(),
            }),
            ControllerError::Conflict { .. }
        ));
        assert!(matches!(
            ControllerError::from(SourceError::Unsupported { operation: "update" }),
            ControllerError::Network { .. }
        ));
    }

    #[test]
    fn classification_helpers() {
        assert!(ControllerError::Cancelled.is_cancellation());
        assert!(!ControllerError::Cancelled.is_retryable());
        assert!(
            ControllerError::Network {
                message: "x".into()
            }
            .is_retryable()
        );
        assert!(
            ControllerError::Malformed {
                message: "x".into()
            }
            .is_retryable()
        );
        assert!(!ControllerError::validation("x").is_retryable());
        assert_eq!(ControllerError::validation("x").kind(), "validation");
    }

    #[test]
    fn display_keeps_context() {
        let err = ControllerError::Network {
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "network request failed: connection reset");
        assert_eq!(
            SourceError::Unsupported { operation: "create" }.to_string(),
            "backend operation not supported"
        );
    }
}

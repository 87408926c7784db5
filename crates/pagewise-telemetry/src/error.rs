//! Error types for telemetry operations.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Installing the tracing subscriber failed.
    #[error("failed to install tracing subscriber")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use tracing_subscriber::util::SubscriberInitExt;

    fn try_init_error() -> Option<tracing_subscriber::util::TryInitError> {
        match tracing_subscriber::registry().try_init() {
            Ok(()) => tracing_subscriber::registry().try_init().err(),
            Err(err) => Some(err),
        }
    }

    #[test]
    fn subscriber_install_keeps_its_source() {
        let source = try_init_error().expect("second install fails");
        let err = TelemetryError::SubscriberInstall { source };
        assert_eq!(err.to_string(), "failed to install tracing subscriber");
        assert!(err.source().is_some());
    }
}

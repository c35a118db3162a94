//! Schwab-specific error types.

use thiserror::Error;

use crate::application::ports::BrokerageError;

/// Errors from the Schwab adapter.
#[derive(Debug, Error, Clone)]
pub enum SchwabError {
    /// Network error (retryable).
    #[error("network error: {0}")]
    Network(String),

    /// API returned a non-success status.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Authentication failed (401/403).
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Rate limited and retries exhausted.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: u64,
    },

    /// Max retries exceeded.
    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

impl From<SchwabError> for BrokerageError {
    fn from(err: SchwabError) -> Self {
        match err {
            SchwabError::Network(message) => Self::Connection { message },
            SchwabError::Api { status, message } => Self::Api { status, message },
            SchwabError::JsonParse(message) => Self::Malformed { message },
            SchwabError::AuthenticationFailed => Self::AuthenticationFailed,
            SchwabError::RateLimited { .. } => Self::RateLimited,
            SchwabError::MaxRetriesExceeded { attempts } => Self::Connection {
                message: format!("max retries exceeded after {attempts} attempts"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_maps_to_connection() {
        let err: BrokerageError = SchwabError::Network("refused".to_string()).into();
        assert!(matches!(err, BrokerageError::Connection { .. }));
    }

    #[test]
    fn auth_error_maps_to_authentication_failed() {
        let err: BrokerageError = SchwabError::AuthenticationFailed.into();
        assert!(matches!(err, BrokerageError::AuthenticationFailed));
    }

    #[test]
    fn parse_error_maps_to_malformed() {
        let err: BrokerageError = SchwabError::JsonParse("eof".to_string()).into();
        assert!(matches!(err, BrokerageError::Malformed { .. }));
    }
}

//! Error taxonomy for the sync surface.
//!
//! | Variant | Meaning | Caller treatment |
//! |---------|---------|------------------|
//! | `Auth` | No credential, expired session, or rejected refresh | Re-authorize; never retried automatically |
//! | `Upstream` | Brokerage API non-success or malformed payloads across every window | Retry later |
//! | `Validation` | Malformed sync request, rejected before any network call | Fix the request |
//! | `Store` | Storage collaborator failure | Operational |
//!
//! Uniqueness conflicts on execution inserts are deliberately absent: they
//! are swallowed inside the reconciliation engine as "already synced".

use thiserror::Error;

use crate::application::ports::{BrokerageError, CredentialError, StoreError};

/// Errors surfaced by a sync invocation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Broker session is missing or unusable; the caller must re-connect.
    #[error("not connected: {0}")]
    Auth(String),

    /// Brokerage API failed for every planned window.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The sync request was malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Storage collaborator failure.
    #[error("storage error: {0}")]
    Store(String),
}

impl From<CredentialError> for SyncError {
    fn from(err: CredentialError) -> Self {
        Self::Auth(err.to_string())
    }
}

impl From<BrokerageError> for SyncError {
    fn from(err: BrokerageError) -> Self {
        match err {
            BrokerageError::AuthenticationFailed => Self::Auth(err.to_string()),
            _ => Self::Upstream(err.to_string()),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_auth_failure_maps_to_auth() {
        let err: SyncError = BrokerageError::AuthenticationFailed.into();
        assert!(matches!(err, SyncError::Auth(_)));
    }

    #[test]
    fn upstream_api_failure_maps_to_upstream() {
        let err: SyncError = BrokerageError::Api {
            status: 500,
            message: "boom".to_string(),
        }
        .into();
        assert!(matches!(err, SyncError::Upstream(_)));
    }

    #[test]
    fn missing_credential_maps_to_auth() {
        let err: SyncError = CredentialError::NotConnected.into();
        assert!(matches!(err, SyncError::Auth(_)));
    }
}

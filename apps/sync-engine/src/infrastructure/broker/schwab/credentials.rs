//! Credential provider: stored Schwab tokens with transparent refresh.
//!
//! Tokens live in the journal store. A token expiring within the margin is
//! refreshed through the OAuth refresh-token grant; refresh tokens rotate,
//! so the new one is persisted when present. The refreshed credential is
//! written back to the store before it is returned, so any later call in
//! the same run observes the updated token.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Duration, Utc};
use tracing::{debug, info};

use super::api_types::TokenResponse;
use super::config::SchwabConfig;
use super::http_client::SchwabHttpClient;
use crate::application::ports::{BrokerCredential, CredentialError, CredentialPort, JournalStore};

/// Refresh when the access token expires within this margin.
const EXPIRY_MARGIN: Duration = Duration::minutes(2);

/// Access-token lifetime assumed when the grant omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 1800;

/// Credential provider over the journal store and the OAuth token endpoint.
pub struct SchwabCredentialProvider<S> {
    store: Arc<S>,
    http: SchwabHttpClient,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl<S: JournalStore> SchwabCredentialProvider<S> {
    /// Create a new provider from config.
    pub fn new(store: Arc<S>, config: &SchwabConfig) -> Result<Self, CredentialError> {
        let http = SchwabHttpClient::new(config).map_err(|e| CredentialError::Store {
            message: e.to_string(),
        })?;
        Ok(Self {
            store,
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    fn basic_auth_header(&self) -> String {
        let basic = BASE64.encode(format!("{}:{}", self.client_id, self.client_secret));
        format!("Basic {basic}")
    }

    async fn refresh(
        &self,
        credential: BrokerCredential,
    ) -> Result<BrokerCredential, CredentialError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", credential.refresh_token.as_str()),
        ];
        let body = self
            .http
            .post_form(&self.token_url, &self.basic_auth_header(), &form)
            .await
            .map_err(|e| CredentialError::RefreshRejected {
                details: e.to_string(),
            })?;

        let token: TokenResponse =
            serde_json::from_value(body.clone()).map_err(|e| CredentialError::RefreshRejected {
                details: format!("unparseable token response: {e}"),
            })?;

        let expires_in = token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let next = BrokerCredential {
            access_token: token.access_token,
            // Refresh tokens rotate; keep the old one if none was issued.
            refresh_token: token.refresh_token.unwrap_or(credential.refresh_token),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            raw: merge_metadata(credential.raw, body),
            ..credential
        };

        // Persist before use so a later call in this run sees the new token.
        self.store
            .put_credential(next.clone())
            .await
            .map_err(|e| CredentialError::Store {
                message: e.to_string(),
            })?;
        info!(
            user_id = %next.user_id,
            account_id = %next.account_id,
            "Refreshed broker access token"
        );
        Ok(next)
    }
}

/// Merge fresh token metadata over the stored raw blob, keeping keys the
/// grant did not return (e.g. the cached routing handle).
fn merge_metadata(stored: serde_json::Value, fresh: serde_json::Value) -> serde_json::Value {
    match (stored, fresh) {
        (serde_json::Value::Object(mut base), serde_json::Value::Object(update)) => {
            for (key, value) in update {
                base.insert(key, value);
            }
            serde_json::Value::Object(base)
        }
        (_, fresh) => fresh,
    }
}

#[async_trait]
impl<S: JournalStore> CredentialPort for SchwabCredentialProvider<S> {
    async fn get_valid_token(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<BrokerCredential, CredentialError> {
        let credential = self
            .store
            .get_credential(user_id, account_id)
            .await
            .map_err(|e| CredentialError::Store {
                message: e.to_string(),
            })?
            .ok_or(CredentialError::NotConnected)?;

        if credential.expires_at - Utc::now() > EXPIRY_MARGIN {
            debug!(user_id, account_id, "Stored access token still valid");
            return Ok(credential);
        }

        self.refresh(credential).await
    }

    async fn save_routing_handle(
        &self,
        user_id: &str,
        account_id: &str,
        routing_handle: &str,
        account_number: Option<&str>,
    ) -> Result<(), CredentialError> {
        let mut credential = self
            .store
            .get_credential(user_id, account_id)
            .await
            .map_err(|e| CredentialError::Store {
                message: e.to_string(),
            })?
            .ok_or(CredentialError::NotConnected)?;

        credential.routing_handle = Some(routing_handle.to_string());
        credential.account_number = account_number.map(String::from);
        self.store
            .put_credential(credential)
            .await
            .map_err(|e| CredentialError::Store {
                message: e.to_string(),
            })
    }
}

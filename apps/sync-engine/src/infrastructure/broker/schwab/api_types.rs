//! Serde models for Schwab API responses.
//!
//! Transaction records themselves are modeled in
//! [`crate::domain::normalize`]; this module covers the surrounding
//! endpoints (account numbers, OAuth token grants, error bodies).

use serde::Deserialize;

/// One record from `/trader/v1/accounts/accountNumbers`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountNumberRecord {
    /// User-facing account number.
    #[serde(default)]
    pub account_number: Option<String>,
    /// Hashed account identifier used on API paths.
    #[serde(default)]
    pub hash_value: Option<String>,
    /// Older key for the same identifier.
    #[serde(default)]
    pub encrypted_account_id: Option<String>,
}

impl AccountNumberRecord {
    /// The opaque routing handle, whichever key carried it.
    #[must_use]
    pub fn routing_handle(&self) -> Option<String> {
        self.hash_value
            .clone()
            .or_else(|| self.encrypted_account_id.clone())
    }
}

/// Response from the OAuth token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// New access token.
    pub access_token: String,
    /// Rotated refresh token, when the grant issues one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access-token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Error body shape returned by the API (best effort).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchwabErrorResponse {
    /// Error code or short tag.
    #[serde(default)]
    pub error: Option<String>,
    /// Human-readable description.
    #[serde(default, alias = "error_description")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn routing_handle_prefers_hash_value() {
        let record: AccountNumberRecord = serde_json::from_value(json!({
            "accountNumber": "1234",
            "hashValue": "HASH",
            "encryptedAccountId": "ENC"
        }))
        .unwrap();
        assert_eq!(record.routing_handle().as_deref(), Some("HASH"));
    }

    #[test]
    fn routing_handle_falls_back_to_encrypted_id() {
        let record: AccountNumberRecord = serde_json::from_value(json!({
            "encryptedAccountId": "ENC"
        }))
        .unwrap();
        assert_eq!(record.routing_handle().as_deref(), Some("ENC"));
    }

    #[test]
    fn token_response_tolerates_missing_optionals() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "at"
        }))
        .unwrap();
        assert_eq!(token.access_token, "at");
        assert!(token.refresh_token.is_none());
        assert!(token.expires_in.is_none());
    }
}

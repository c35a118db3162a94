//! Schwab implementation of the brokerage port.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use super::api_types::AccountNumberRecord;
use super::config::SchwabConfig;
use super::error::SchwabError;
use super::http_client::SchwabHttpClient;
use crate::application::ports::{AccountNumberPair, BrokerageError, BrokeragePort};
use crate::domain::normalize::RawTransaction;

/// Brokerage adapter over the Schwab trader API.
#[derive(Debug, Clone)]
pub struct SchwabBrokerageAdapter {
    http: SchwabHttpClient,
}

impl SchwabBrokerageAdapter {
    /// Create a new adapter from config.
    pub fn new(config: &SchwabConfig) -> Result<Self, SchwabError> {
        Ok(Self {
            http: SchwabHttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl BrokeragePort for SchwabBrokerageAdapter {
    async fn list_transactions(
        &self,
        access_token: &str,
        routing_handle: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        type_filter: &str,
    ) -> Result<Vec<RawTransaction>, BrokerageError> {
        let path = format!("/trader/v1/accounts/{routing_handle}/transactions");
        let query = [
            (
                "startDateTime",
                start.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            (
                "endDateTime",
                end.to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            ("types", type_filter.to_string()),
        ];

        let transactions: Vec<RawTransaction> =
            self.http.get(access_token, &path, &query).await?;
        Ok(transactions)
    }

    async fn list_account_numbers(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccountNumberPair>, BrokerageError> {
        let records: Vec<AccountNumberRecord> = self
            .http
            .get(access_token, "/trader/v1/accounts/accountNumbers", &[])
            .await?;

        Ok(records
            .into_iter()
            .map(|record| AccountNumberPair {
                routing_handle: record.routing_handle(),
                account_number: record.account_number,
            })
            .collect())
    }
}

//! Driven ports: interfaces the sync engine needs from the outside world.
//!
//! Storage, the brokerage API, and credential management are external
//! collaborators; the engine only depends on the traits here. Adapters live
//! in `infrastructure`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::domain::normalize::RawTransaction;
use crate::domain::trade::{Account, Execution, ExecutionAction, Trade};

// ============================================================================
// Brokerage API
// ============================================================================

/// Errors from the brokerage API collaborator.
#[derive(Debug, Error, Clone)]
pub enum BrokerageError {
    /// Network-level failure or timeout.
    #[error("connection error: {message}")]
    Connection {
        /// Underlying failure description.
        message: String,
    },

    /// Non-success response from the API.
    #[error("API error {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body or error message.
        message: String,
    },

    /// Response body could not be parsed.
    #[error("malformed response: {message}")]
    Malformed {
        /// Parse failure description.
        message: String,
    },

    /// Credentials were rejected by the API.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Rate limited and retries exhausted.
    #[error("rate limited")]
    RateLimited,
}

/// One entry from the account-numbers endpoint: the user-facing account
/// number together with the opaque routing handle used on API paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountNumberPair {
    /// User-facing account number.
    pub account_number: Option<String>,
    /// Hashed/obscured account identifier for API calls.
    pub routing_handle: Option<String>,
}

/// Brokerage transaction-history API.
#[async_trait]
pub trait BrokeragePort: Send + Sync {
    /// Fetch raw transactions for one account and time window.
    async fn list_transactions(
        &self,
        access_token: &str,
        routing_handle: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        type_filter: &str,
    ) -> Result<Vec<RawTransaction>, BrokerageError>;

    /// List the account numbers (and routing handles) visible to the token.
    async fn list_account_numbers(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccountNumberPair>, BrokerageError>;
}

// ============================================================================
// Credentials
// ============================================================================

/// A stored broker credential for one (user, account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerCredential {
    /// Owning user.
    pub user_id: String,
    /// Owning account.
    pub account_id: String,
    /// Current access token.
    pub access_token: String,
    /// Current refresh token (rotates on refresh).
    pub refresh_token: String,
    /// Access-token expiry.
    pub expires_at: DateTime<Utc>,
    /// Cached routing handle, fetched once and persisted for reuse.
    pub routing_handle: Option<String>,
    /// Broker-side account number, cached alongside the handle.
    pub account_number: Option<String>,
    /// Raw token metadata, merged across refreshes.
    pub raw: serde_json::Value,
}

/// Errors from the credential provider.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credential stored for this account; the caller must connect.
    #[error("broker is not connected for this account; reconnect required")]
    NotConnected,

    /// The refresh grant was rejected.
    #[error("token refresh rejected; re-connect may be required: {details}")]
    RefreshRejected {
        /// Upstream response details.
        details: String,
    },

    /// Credential storage failure.
    #[error("credential store error: {message}")]
    Store {
        /// Underlying failure description.
        message: String,
    },
}

/// Credential provider: hands out a valid access token, refreshing
/// transparently when the stored one is within the expiry margin.
#[async_trait]
pub trait CredentialPort: Send + Sync {
    /// Get a valid credential for the account, refreshing if needed.
    ///
    /// Refreshed credentials are persisted before they are returned, so a
    /// later call in the same run sees the updated token.
    async fn get_valid_token(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<BrokerCredential, CredentialError>;

    /// Persist a freshly resolved routing handle onto the credential record.
    async fn save_routing_handle(
        &self,
        user_id: &str,
        account_id: &str,
        routing_handle: &str,
        account_number: Option<&str>,
    ) -> Result<(), CredentialError>;
}

// ============================================================================
// Storage
// ============================================================================

/// Errors from the journal store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Uniqueness violation (e.g. duplicate `(account, broker_exec_id)`).
    ///
    /// Under concurrent retries this is an expected outcome, not a failure;
    /// the reconciliation engine treats it as "already synced".
    #[error("conflict on {key}")]
    Conflict {
        /// The violated key.
        key: String,
    },

    /// Referenced row does not exist.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing row.
        what: String,
    },

    /// Any other storage failure.
    #[error("store error: {message}")]
    Internal {
        /// Underlying failure description.
        message: String,
    },
}

/// Key-scoped storage for accounts, trades, executions, and credentials.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Look up a user-facing account.
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, StoreError>;

    /// Create or replace an account record.
    async fn upsert_account(&self, account: Account) -> Result<(), StoreError>;

    /// Fetch the stored broker credential for an account.
    async fn get_credential(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<Option<BrokerCredential>, StoreError>;

    /// Store (insert or replace) a broker credential.
    async fn put_credential(&self, credential: BrokerCredential) -> Result<(), StoreError>;

    /// All OPEN trades for an account.
    async fn open_trades(&self, user_id: &str, account_id: &str)
    -> Result<Vec<Trade>, StoreError>;

    /// Next monotonic trade number for a user (`max + 1`, starting at 1).
    async fn next_trade_no(&self, user_id: &str) -> Result<i64, StoreError>;

    /// Insert a new trade. Conflicts on `(user, account, trade_no)`.
    async fn insert_trade(&self, trade: &Trade) -> Result<(), StoreError>;

    /// Close a trade: set status, closed date, and realized P/L.
    async fn close_trade(
        &self,
        trade_id: Uuid,
        closed_at: NaiveDate,
        pnl: Option<Decimal>,
    ) -> Result<(), StoreError>;

    /// Delete a trade and, cascading, all of its executions.
    async fn delete_trade(&self, trade_id: Uuid) -> Result<(), StoreError>;

    /// A trade's executions, ordered by `executed_at` ascending.
    async fn executions_for_trade(&self, trade_id: Uuid) -> Result<Vec<Execution>, StoreError>;

    /// Whether an execution with this broker exec id already exists for the
    /// account. Backs the idempotency check for repeated syncs.
    async fn execution_exists(
        &self,
        account_id: &str,
        broker_exec_id: &str,
    ) -> Result<bool, StoreError>;

    /// Insert an execution. Fails with [`StoreError::Conflict`] when the
    /// `(account, broker_exec_id)` uniqueness is violated.
    async fn insert_execution(&self, execution: &Execution) -> Result<(), StoreError>;

    /// Rewrite the derived action labels of a trade's executions.
    async fn relabel_executions(
        &self,
        trade_id: Uuid,
        labels: &[(Uuid, ExecutionAction)],
    ) -> Result<(), StoreError>;

    /// Acquire the account-scoped lock serializing reconciliation runs.
    ///
    /// Two concurrent syncs for the same account must not interleave; the
    /// guard is held for the duration of the reconciliation step.
    async fn lock_account(&self, account_id: &str) -> OwnedMutexGuard<()>;
}

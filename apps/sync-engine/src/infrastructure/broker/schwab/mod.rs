//! Schwab trader API adapter: transaction history, account numbers, and
//! OAuth token refresh over the shared retrying HTTP client.

pub mod adapter;
pub mod api_types;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http_client;

pub use adapter::SchwabBrokerageAdapter;
pub use config::{RetryConfig, SchwabConfig};
pub use credentials::SchwabCredentialProvider;
pub use error::SchwabError;

// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Sync Engine - Execution Reconciliation and Position Ledger
//!
//! Pulls a brokerage account's raw trade-execution history, normalizes it
//! into fills, and reconciles those fills into durable trades, executions,
//! and an average-cost ledger with realized P/L.
//!
//! # Architecture (Clean Architecture + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Pure logic with no I/O
//!   - `fill`: normalized fill value objects
//!   - `normalize`: permissive brokerage payload models and field fallbacks
//!   - `ledger`: average-cost replay deriving position and realized P/L
//!   - `trade`: trade/execution records and action labeling
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: `BrokeragePort`, `CredentialPort`, `JournalStore`
//!   - `reconcile`: idempotent fill-to-trade reconciliation
//!   - `sync`: windowed fetch orchestration
//!
//! - **Infrastructure**: Adapters
//!   - `broker::schwab`: trader API + OAuth token refresh
//!   - `persistence`: in-memory journal store
//!
//! - **Server**: HTTP/JSON API over the sync service

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Server layer - HTTP API.
pub mod server;

/// Error taxonomy shared across layers.
pub mod error;

// Domain re-exports
pub use domain::fill::{Fill, Side, Symbol};
pub use domain::ledger::{LedgerRow, build_ledger};
pub use domain::trade::{Account, Execution, ExecutionAction, Trade, TradeStatus};

// Application re-exports
pub use application::ports::{
    BrokerCredential, BrokeragePort, CredentialPort, JournalStore, StoreError,
};
pub use application::reconcile::{ReconcileEngine, ReconcileSummary};
pub use application::sync::{SyncConfig, SyncMode, SyncRequest, SyncService, SyncSummary};
pub use error::SyncError;

// Infrastructure re-exports
pub use infrastructure::broker::schwab::{
    SchwabBrokerageAdapter, SchwabConfig, SchwabCredentialProvider,
};
pub use infrastructure::persistence::InMemoryJournalStore;

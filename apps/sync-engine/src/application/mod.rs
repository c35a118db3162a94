//! Application layer: the reconciliation engine, the sync use case, and the
//! driven ports they depend on.

pub mod ports;
pub mod reconcile;
pub mod sync;

pub use reconcile::{ReconcileEngine, ReconcileSummary};
pub use sync::{SyncConfig, SyncMode, SyncRequest, SyncService, SyncSummary};

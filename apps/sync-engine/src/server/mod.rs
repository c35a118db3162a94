//! Server implementations for the sync engine.

pub mod http;

pub use http::{SyncServer, create_router};

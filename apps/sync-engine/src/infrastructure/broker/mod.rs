//! Brokerage adapters implementing the application's driven ports.

pub mod schwab;

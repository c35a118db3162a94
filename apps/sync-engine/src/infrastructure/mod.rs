//! Infrastructure layer: concrete adapters for the application's ports.

pub mod broker;
pub mod persistence;

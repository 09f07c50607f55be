//! Cloud provider implementations

pub mod azure;

pub use azure::AzureCli;

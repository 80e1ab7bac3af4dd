//! Investfolio Core - Domain entities, services, and traits.
//!
//! This crate contains the core business logic for broker statement
//! ingestion and portfolio ledger maintenance. It is database-agnostic
//! and defines traits that are implemented by the storage and gateway
//! collaborator crates.

pub mod constants;
pub mod errors;
pub mod holdings;
pub mod ingest;
pub mod quotes;
pub mod securities;
pub mod statements;

// Re-export common types
pub use holdings::*;
pub use securities::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;

//! Core error types for the ingestion and ledger services.
//!
//! This module defines database-agnostic error types. Storage-specific
//! errors (from whichever engine the storage crate uses) are converted to
//! these types by the storage layer.

use chrono::{NaiveDate, ParseError as ChronoParseError};
use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the ledger core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Statement error: {0}")]
    Statement(#[from] StatementError),

    #[error("Identity resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Ingestion rejected: {0}")]
    Ingest(#[from] IngestError),

    #[error("Market data operation failed: {0}")]
    MarketData(String),

    #[error("Input validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Database-agnostic error type for storage operations.
///
/// Uses `String` for all error details, allowing the storage layer to
/// convert engine-specific errors into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// The requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// A unique constraint was violated (e.g., duplicate key).
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Internal/unexpected database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Structural statement parsing failures.
///
/// All variants are terminal for the current ingestion attempt.
#[derive(Error, Debug)]
pub enum StatementError {
    /// The document has no recognizable table of a required kind, or a
    /// required piece of metadata (period bounds) is missing or garbled.
    #[error("Malformed statement: {reason}")]
    Malformed { reason: String },

    /// A trade row's security could not be mapped to an ISIN through the
    /// holdings or reference tables.
    #[error("Could not determine ISIN for security: name='{name}', code='{code}'")]
    UnresolvedIsin { name: String, code: String },
}

/// Security identity resolution failures.
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// The ISIN could not be resolved to a security kind after exhausting
    /// the local catalogs, the on-demand market refresh, the statement's
    /// own hints, and the foreign-market defaulting rule.
    #[error("Unknown instrument isin={isin} (name: {name})")]
    UnresolvedIdentity { isin: String, name: String },
}

/// Statement-level ingestion rejections. Pure validation; nothing has been
/// persisted when one of these is returned.
#[derive(Error, Debug)]
pub enum IngestError {
    /// A statement with the exact same period bounds was already ingested.
    #[error("Statement for period {start} - {end} is already ingested")]
    DuplicateStatement { start: NaiveDate, end: NaiveDate },

    /// The new statement's period is strictly narrower than an already
    /// ingested one; a narrower statement can never supersede a wider one.
    #[error("Statement for period {start} - {end} overlaps already ingested period {existing_start} - {existing_end}")]
    OverlappingStatement {
        start: NaiveDate,
        end: NaiveDate,
        existing_start: NaiveDate,
        existing_end: NaiveDate,
    },
}

/// Validation errors for user input and data parsing.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to parse decimal number: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Failed to parse date/time: {0}")]
    DateTimeParse(#[from] ChronoParseError),
}

// === From implementations for common error types ===

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(ValidationError::DecimalParse(err))
    }
}

impl From<ChronoParseError> for Error {
    fn from(err: ChronoParseError) -> Self {
        Error::Validation(ValidationError::DateTimeParse(err))
    }
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

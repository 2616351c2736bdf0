//! Error types for the account ledger
//!
//! This module provides the unified error type shared by the store adapters
//! and the ledger engine. Business failures (`AlreadyExists`,
//! `InsufficientFunds`, ...) are distinct variants so callers can map them
//! without string matching.

use std::fmt::Display;
use thiserror::Error;

/// Account ledger error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed identifier, account type, filter or amount
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An open account of the requested type already exists for the owner
    #[error("Account already exists: {0}")]
    AlreadyExists(String),

    /// A withdrawal would take the balance below the overdraft limit
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    /// The account does not exist or is not in a state that allows the operation
    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    /// Deletion attempted on an account that has not been closed
    #[error("Account is open: {0}")]
    OpenAccount(String),

    /// Point read found nothing under the key
    #[error("Account not found: {0}")]
    NotFound(String),

    /// A store-side condition did not hold; the write was not applied
    #[error("Condition failed: {0}")]
    ConditionFailed(String),

    /// The store did not answer in time; the outcome of the call is unknown
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A remote collaborator could not be reached or refused the request
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Decimal conversion error
    #[error("Decimal conversion error: {0}")]
    DecimalError(String),
}

impl Error {
    /// Whether the error leaves the outcome of the store call unknown
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait to add context to error results
pub trait ErrorExt<T> {
    /// Add context information to an error
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T> ErrorExt<T> for Result<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| {
            let context = context_fn().to_string();
            match e {
                Error::InvalidInput(msg) => Error::InvalidInput(format!("{}: {}", context, msg)),
                Error::AlreadyExists(msg) => Error::AlreadyExists(format!("{}: {}", context, msg)),
                Error::InsufficientFunds(msg) => Error::InsufficientFunds(format!("{}: {}", context, msg)),
                Error::InvalidAccount(msg) => Error::InvalidAccount(format!("{}: {}", context, msg)),
                Error::OpenAccount(msg) => Error::OpenAccount(format!("{}: {}", context, msg)),
                Error::NotFound(msg) => Error::NotFound(format!("{}: {}", context, msg)),
                Error::ConditionFailed(msg) => Error::ConditionFailed(format!("{}: {}", context, msg)),
                Error::Timeout(msg) => Error::Timeout(format!("{}: {}", context, msg)),
                Error::Unavailable(msg) => Error::Unavailable(format!("{}: {}", context, msg)),
                Error::ConfigurationError(msg) => Error::ConfigurationError(format!("{}: {}", context, msg)),
                Error::Internal(msg) => Error::Internal(format!("{}: {}", context, msg)),
                Error::Database(e) => Error::Database(e),
                Error::Serialization(e) => Error::Serialization(e),
                Error::DecimalError(msg) => Error::DecimalError(format!("{}: {}", context, msg)),
            }
        })
    }
}

/// Trait for converting other error types to our Error type
pub trait IntoError {
    /// Convert to Error
    fn into_error(self, message: &str) -> Error;
}

impl<E: std::error::Error> IntoError for E {
    fn into_error(self, message: &str) -> Error {
        Error::Internal(format!("{}: {}", message, self))
    }
}

/// Convert string messages into an error
impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Internal(message)
    }
}

/// Convert static string references into an error
impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Internal(message.to_string())
    }
}

/// From rust_decimal::Error
impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::DecimalError(err.to_string())
    }
}

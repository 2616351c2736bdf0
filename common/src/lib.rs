//! Common types and utilities for the account ledger
//!
//! This library contains the shared types used by the ledger engine: error
//! handling, decimal amounts, the account domain model, key derivation,
//! input validation and the conditional-write key-value store boundary.

pub mod error;
pub mod model;
pub mod decimal;
pub mod keys;
pub mod validation;
pub mod db;

/// Re-export important types
pub use error::{Error, Result, ErrorExt, IntoError};
pub use decimal::*;

// Re-export store types
pub use db::{KeyValueStore, InMemoryStore, PostgresStore};

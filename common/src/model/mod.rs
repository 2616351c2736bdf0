//! Domain models for the account ledger

pub mod account;
pub mod transaction;

pub use account::{Account, AccountType, ListFilter};
pub use transaction::{AccountWithTransactions, Transaction};

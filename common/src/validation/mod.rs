//! Input validation and the account type limit table
//!
//! Everything here is pure: no store access, no clock. Validation runs before
//! the first store call of every operation.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::decimal::{precision, Amount};
use crate::error::{Error, Result};
use crate::keys::{ACCOUNT_PREFIX, OWNER_PREFIX};
use crate::model::account::AccountType;

/// Longest accepted raw owner identifier, in bytes
pub const MAX_OWNER_ID_LEN: usize = 128;

/// Validate an owner ID (raw or tagged) and return its raw form
pub fn validate_owner_id(user_id: &str) -> Result<&str> {
    let raw = user_id.strip_prefix(OWNER_PREFIX).unwrap_or(user_id);

    if raw.is_empty() {
        return Err(Error::InvalidInput("owner id must not be empty".to_string()));
    }
    if raw.len() > MAX_OWNER_ID_LEN {
        return Err(Error::InvalidInput(format!(
            "owner id longer than {} bytes",
            MAX_OWNER_ID_LEN
        )));
    }
    if raw.contains('#') || raw.chars().any(char::is_whitespace) {
        return Err(Error::InvalidInput(format!("invalid owner id: {}", user_id)));
    }

    Ok(raw)
}

/// Validate an account ID (raw or tagged) and parse it
pub fn validate_account_id(account_id: &str) -> Result<Uuid> {
    let raw = account_id.strip_prefix(ACCOUNT_PREFIX).unwrap_or(account_id);
    Uuid::parse_str(raw).map_err(|_| Error::InvalidInput(format!("invalid account id: {}", account_id)))
}

/// Validate a deposit or withdrawal amount
pub fn validate_amount(amount: Amount) -> Result<Amount> {
    let amount = precision::round_amount(amount);
    if amount <= Amount::ZERO {
        return Err(Error::InvalidInput(format!(
            "invalid amount {}, must be greater than zero",
            amount
        )));
    }
    Ok(amount)
}

/// Overdraft limit per account type.
///
/// Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitTable {
    limits: BTreeMap<AccountType, u32>,
}

impl Default for LimitTable {
    fn default() -> Self {
        Self::new(50, 10)
    }
}

impl LimitTable {
    /// Table with explicit limits for every account type
    pub fn new(checking: u32, saving: u32) -> Self {
        let limits = BTreeMap::from([
            (AccountType::Checking, checking),
            (AccountType::Saving, saving),
        ]);
        Self { limits }
    }

    /// Overdraft limit for a type
    pub fn limit_for(&self, account_type: AccountType) -> Result<u32> {
        self.limits.get(&account_type).copied().ok_or_else(|| {
            Error::InvalidInput(format!("no limit configured for account type {}", account_type))
        })
    }

    /// Parse a type name and look up its limit
    pub fn lookup(&self, account_type: &str) -> Result<(AccountType, u32)> {
        let account_type: AccountType = account_type.parse()?;
        Ok((account_type, self.limit_for(account_type)?))
    }
}

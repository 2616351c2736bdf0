//! Account models and related types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Amount;
use crate::error::Error;

/// Kind of account; each kind carries its own overdraft limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Everyday account with the larger overdraft
    Checking,
    /// Savings account
    Saving,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Saving => "saving",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checking" => Ok(AccountType::Checking),
            "saving" => Ok(AccountType::Saving),
            other => Err(Error::InvalidInput(format!(
                "invalid account type '{}', supported options are: 'checking', 'saving'",
                other
            ))),
        }
    }
}

/// Which accounts a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFilter {
    /// Accounts without a closing date
    Open,
    /// Accounts with a closing date
    Closed,
    /// Everything
    All,
}

impl ListFilter {
    /// Whether an account passes this filter
    pub fn matches(&self, account: &Account) -> bool {
        match self {
            ListFilter::Open => account.is_open(),
            ListFilter::Closed => !account.is_open(),
            ListFilter::All => true,
        }
    }
}

impl FromStr for ListFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(ListFilter::Open),
            "closed" => Ok(ListFilter::Closed),
            "all" => Ok(ListFilter::All),
            other => Err(Error::InvalidInput(format!(
                "invalid filter '{}', supported: 'open', 'closed', 'all'",
                other
            ))),
        }
    }
}

/// Account model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Owning user ID (raw, without key tag)
    pub owner: String,
    /// Unique account ID
    pub id: Uuid,
    /// Current balance; may go negative down to `-limit`
    pub balance: Amount,
    /// Overdraft limit fixed at creation
    pub limit: u32,
    /// Opening timestamp
    pub opened_at: DateTime<Utc>,
    /// Closing timestamp, absent while the account is open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Account type
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

impl Account {
    /// Create a new open account with a zero balance and a fresh ID
    pub fn open(owner: impl Into<String>, account_type: AccountType, limit: u32) -> Self {
        Self {
            owner: owner.into(),
            id: Uuid::new_v4(),
            balance: Amount::ZERO,
            limit,
            opened_at: Utc::now(),
            closed_at: None,
            account_type,
        }
    }

    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// Lowest balance the account may reach
    pub fn floor(&self) -> Amount {
        -Amount::from(self.limit)
    }

    /// Whether withdrawing `amount` keeps the balance at or above the floor
    pub fn can_withdraw(&self, amount: Amount) -> bool {
        self.balance
            .checked_sub(amount)
            .map_or(false, |rest| rest >= self.floor())
    }

    /// Smallest balance from which `amount` can be withdrawn.
    ///
    /// `balance >= amount - limit` is the same predicate as
    /// `balance - amount >= -limit`, phrased over the stored balance alone.
    pub fn withdrawal_threshold(&self, amount: Amount) -> Amount {
        amount + self.floor()
    }

    /// Closing timestamp to record, never earlier than the opening time
    pub fn closing_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.max(self.opened_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::dec;

    #[test]
    fn test_withdraw_bound() {
        let mut account = Account::open("u1", AccountType::Checking, 50);
        account.balance = dec!(45.12);

        assert!(account.can_withdraw(dec!(90)));
        assert!(account.can_withdraw(dec!(95.12)));
        assert!(!account.can_withdraw(dec!(95.13)));
        assert_eq!(account.withdrawal_threshold(dec!(90)), dec!(40));
    }

    #[test]
    fn test_withdraw_bound_on_overflow() {
        let mut account = Account::open("u1", AccountType::Checking, 50);
        account.balance = dec!(-10);

        assert!(!account.can_withdraw(Amount::MAX));
        assert_eq!(account.withdrawal_threshold(Amount::MAX), Amount::MAX - dec!(50));
    }

    #[test]
    fn test_parse_type_and_filter() {
        assert_eq!("saving".parse::<AccountType>().unwrap(), AccountType::Saving);
        assert!(matches!("gold".parse::<AccountType>(), Err(Error::InvalidInput(_))));
        assert_eq!("closed".parse::<ListFilter>().unwrap(), ListFilter::Closed);
        assert!("OPEN".parse::<ListFilter>().is_err());
    }

    #[test]
    fn test_json_shape() {
        let account = Account::open("u1", AccountType::Checking, 50);
        let json = serde_json::to_value(&account).unwrap();

        assert_eq!(json["type"], "checking");
        assert_eq!(json["balance"], "0");
        assert!(json.get("openedAt").is_some());
        assert!(json.get("closedAt").is_none());
    }
}

//! Transaction records served by the transactions service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Amount;
use crate::model::account::Account;

/// A single transaction as reported by the transactions service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Account listing entry enriched with its transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountWithTransactions {
    #[serde(flatten)]
    pub account: Account,
    pub transactions: Vec<Transaction>,
}

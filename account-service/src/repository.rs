//! Repository for account data
//!
//! Maps accounts and type slots onto store items and bounds every store call
//! with the configured timeout. It makes no decisions of its own: conditions
//! are supplied by the service and store failures are passed through.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::db::{Condition, Consistency, Item, KeyValueStore, UpdateAction};
use common::error::{Error, Result};
use common::keys::{self, ACCOUNT_PREFIX};
use common::model::account::{Account, AccountType, ListFilter};
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;
use uuid::Uuid;

/// Attribute names of an account item
pub mod attr {
    pub const OWNER: &str = "owner";
    pub const ID: &str = "id";
    pub const BALANCE: &str = "balance";
    pub const LIMIT: &str = "limit";
    pub const OPENED_AT: &str = "openedAt";
    pub const CLOSED_AT: &str = "closedAt";
    pub const TYPE: &str = "type";

    /// Account currently holding a type slot
    pub const HOLDER: &str = "accountId";
    /// When the slot was reserved
    pub const RESERVED_AT: &str = "reservedAt";
}

/// Who holds the "open account of this type" slot for an owner
#[derive(Debug, Clone, PartialEq)]
pub struct SlotReservation {
    pub account_id: Uuid,
    pub reserved_at: DateTime<Utc>,
}

/// Encode an account as a store item
pub fn account_to_item(account: &Account) -> Item {
    let mut item = Item::new(keys::account_item_key(&account.owner, &account.id.to_string()))
        .with(attr::OWNER, account.owner.as_str())
        .with(attr::ID, account.id.to_string())
        .with(attr::BALANCE, account.balance)
        .with(attr::LIMIT, account.limit)
        .with(attr::OPENED_AT, account.opened_at)
        .with(attr::TYPE, account.account_type.as_str());
    if let Some(closed_at) = account.closed_at {
        item.set(attr::CLOSED_AT, closed_at);
    }
    item
}

/// Decode a store item into an account
pub fn item_to_account(item: &Item) -> Result<Account> {
    let id = Uuid::parse_str(item.get_str(attr::ID)?)
        .map_err(|e| Error::Internal(format!("Invalid account id in {}: {}", item.key, e)))?;
    let limit = item
        .get_number(attr::LIMIT)?
        .to_u32()
        .ok_or_else(|| Error::Internal(format!("Invalid limit in {}", item.key)))?;

    Ok(Account {
        owner: item.get_str(attr::OWNER)?.to_string(),
        id,
        balance: item.get_number(attr::BALANCE)?,
        limit,
        opened_at: item.get_timestamp(attr::OPENED_AT)?,
        closed_at: item.get_optional_timestamp(attr::CLOSED_AT)?,
        account_type: item.get_str(attr::TYPE)?.parse::<AccountType>()?,
    })
}

/// Store filter selecting accounts by lifecycle state
pub fn list_filter_condition(filter: ListFilter) -> Option<Condition> {
    match filter {
        ListFilter::Open => Some(Condition::not_exists(attr::CLOSED_AT)),
        ListFilter::Closed => Some(Condition::exists(attr::CLOSED_AT)),
        ListFilter::All => None,
    }
}

/// Account repository over a conditional-write key-value store
#[derive(Clone)]
pub struct AccountRepository {
    /// Shared store client
    store: Arc<dyn KeyValueStore>,
    /// Upper bound for every store call
    timeout: Duration,
}

impl AccountRepository {
    /// Create a new account repository
    pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} did not complete within {:?}",
                operation, self.timeout
            ))),
        }
    }

    /// Strongly consistent point read of an account
    pub async fn get_account(&self, owner: &str, account_id: Uuid) -> Result<Option<Account>> {
        let key = keys::account_item_key(owner, &account_id.to_string());
        debug!("Getting account {}", key);

        let item = self
            .bounded("get account", self.store.get(&key, Consistency::Strong))
            .await?;
        item.as_ref().map(item_to_account).transpose()
    }

    /// All accounts of an owner passing `filter`, ordered by account key
    pub async fn list_accounts(&self, owner: &str, filter: ListFilter) -> Result<Vec<Account>> {
        let partition = keys::owner_key(owner);
        let condition = list_filter_condition(filter);
        debug!("Listing {:?} accounts of {}", filter, partition);

        let items = self
            .bounded(
                "list accounts",
                self.store.query(&partition, ACCOUNT_PREFIX, condition.as_ref()),
            )
            .await?;
        items.iter().map(item_to_account).collect()
    }

    /// First write of a new account; fails if anything already sits at its key
    pub async fn insert_account(&self, account: &Account) -> Result<()> {
        let item = account_to_item(account);
        debug!("Inserting account {}", item.key);

        let absent = Condition::not_exists(attr::ID);
        self.bounded("insert account", self.store.put(item, Some(&absent)))
            .await
    }

    /// Atomic conditional update; returns the account as written
    pub async fn update_account(
        &self,
        owner: &str,
        account_id: Uuid,
        actions: &[UpdateAction],
        condition: &Condition,
    ) -> Result<Account> {
        let key = keys::account_item_key(owner, &account_id.to_string());
        debug!("Updating account {} if {}", key, condition);

        let item = self
            .bounded("update account", self.store.update(&key, actions, Some(condition)))
            .await?;
        item_to_account(&item)
    }

    /// Conditional removal of an account
    pub async fn delete_account(&self, owner: &str, account_id: Uuid, condition: &Condition) -> Result<()> {
        let key = keys::account_item_key(owner, &account_id.to_string());
        debug!("Deleting account {} if {}", key, condition);

        self.bounded("delete account", self.store.delete(&key, Some(condition)))
            .await
    }

    /// Claim the type slot for `account_id`; fails if any holder is recorded
    pub async fn reserve_slot(&self, owner: &str, account_type: AccountType, account_id: Uuid) -> Result<()> {
        let item = Item::new(keys::slot_item_key(owner, account_type))
            .with(attr::HOLDER, account_id.to_string())
            .with(attr::RESERVED_AT, Utc::now());
        debug!("Reserving slot {} for {}", item.key, account_id);

        let vacant = Condition::not_exists(attr::HOLDER);
        self.bounded("reserve slot", self.store.put(item, Some(&vacant)))
            .await
    }

    /// Current holder of a type slot
    pub async fn get_slot(&self, owner: &str, account_type: AccountType) -> Result<Option<SlotReservation>> {
        let key = keys::slot_item_key(owner, account_type);

        let item = self
            .bounded("get slot", self.store.get(&key, Consistency::Strong))
            .await?;

        match item {
            Some(item) => {
                let account_id = Uuid::parse_str(item.get_str(attr::HOLDER)?)
                    .map_err(|e| Error::Internal(format!("Invalid slot holder in {}: {}", item.key, e)))?;
                Ok(Some(SlotReservation {
                    account_id,
                    reserved_at: item.get_timestamp(attr::RESERVED_AT)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Free a type slot, but only while `holder` still holds it
    pub async fn release_slot(&self, owner: &str, account_type: AccountType, holder: Uuid) -> Result<()> {
        let key = keys::slot_item_key(owner, account_type);
        debug!("Releasing slot {} held by {}", key, holder);

        let still_held = Condition::equals(attr::HOLDER, holder.to_string());
        self.bounded("release slot", self.store.delete(&key, Some(&still_held)))
            .await
    }
}

//! Conditional-write key-value store boundary
//!
//! The ledger engine talks to its storage only through [`KeyValueStore`].
//! The contract is deliberately narrow: every call touches a single item and
//! the optional [`Condition`] is evaluated by the store in the same
//! indivisible step as the write. There are no multi-item transactions.

use async_trait::async_trait;

use crate::error::Result;

pub mod expression;
pub mod item;
pub mod memory;
pub mod postgres;

pub use expression::{Condition, UpdateAction};
pub use item::{AttributeValue, Item, ItemKey};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Read consistency requested for a point read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// May miss the most recent writes
    Eventual,
    /// Observes every write acknowledged before the read started
    Strong,
}

/// Key-value store with per-item atomic conditional writes
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write a whole item, replacing any existing one.
    ///
    /// Fails with `ConditionFailed` when `condition` does not hold for the
    /// current item (or for "no item" when the key is vacant).
    async fn put(&self, item: Item, condition: Option<&Condition>) -> Result<()>;

    /// Point read by exact key
    async fn get(&self, key: &ItemKey, consistency: Consistency) -> Result<Option<Item>>;

    /// Items of one partition whose sort key starts with `sort_prefix`,
    /// ordered by sort key, optionally filtered.
    async fn query(
        &self,
        partition: &str,
        sort_prefix: &str,
        filter: Option<&Condition>,
    ) -> Result<Vec<Item>>;

    /// Apply `actions` atomically and return the item as written.
    ///
    /// A vacant key is treated as an empty item, so callers that need the
    /// item to exist must say so in `condition`.
    async fn update(
        &self,
        key: &ItemKey,
        actions: &[UpdateAction],
        condition: Option<&Condition>,
    ) -> Result<Item>;

    /// Remove an item. Deleting a vacant key succeeds unless `condition` fails.
    async fn delete(&self, key: &ItemKey, condition: Option<&Condition>) -> Result<()>;
}

pub(crate) fn check_condition(
    condition: Option<&Condition>,
    key: &ItemKey,
    current: Option<&Item>,
) -> Result<()> {
    match condition {
        Some(condition) if !condition.evaluate(current) => Err(crate::Error::ConditionFailed(
            format!("{} does not hold for {}", condition, key),
        )),
        _ => Ok(()),
    }
}

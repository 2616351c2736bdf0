//! In-memory store for tests and local runs
//!
//! Per-item atomicity comes from `DashMap`'s entry API: the shard holding the
//! key stays write-locked while the condition is evaluated and the new value
//! is written.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::db::expression::{apply_all, Condition, UpdateAction};
use crate::db::item::{Item, ItemKey};
use crate::db::{check_condition, Consistency, KeyValueStore};
use crate::error::Result;

/// In-memory key-value store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Items by composite key
    pub items: DashMap<ItemKey, Item>,
}

impl InMemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn put(&self, item: Item, condition: Option<&Condition>) -> Result<()> {
        debug!("put {}", item.key);
        match self.items.entry(item.key.clone()) {
            Entry::Occupied(mut entry) => {
                check_condition(condition, &item.key, Some(entry.get()))?;
                entry.insert(item);
            }
            Entry::Vacant(entry) => {
                check_condition(condition, &item.key, None)?;
                entry.insert(item);
            }
        }
        Ok(())
    }

    async fn get(&self, key: &ItemKey, _consistency: Consistency) -> Result<Option<Item>> {
        Ok(self.items.get(key).map(|item| item.clone()))
    }

    async fn query(
        &self,
        partition: &str,
        sort_prefix: &str,
        filter: Option<&Condition>,
    ) -> Result<Vec<Item>> {
        let mut items: Vec<Item> = self
            .items
            .iter()
            .filter(|entry| {
                let key = entry.key();
                key.partition == partition && key.sort.starts_with(sort_prefix)
            })
            .filter(|entry| filter.map_or(true, |f| f.evaluate(Some(entry.value()))))
            .map(|entry| entry.value().clone())
            .collect();

        items.sort_by(|a, b| a.key.sort.cmp(&b.key.sort));
        Ok(items)
    }

    async fn update(
        &self,
        key: &ItemKey,
        actions: &[UpdateAction],
        condition: Option<&Condition>,
    ) -> Result<Item> {
        debug!("update {} with {} action(s)", key, actions.len());
        match self.items.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                check_condition(condition, key, Some(entry.get()))?;
                let mut next = entry.get().clone();
                apply_all(&mut next, actions)?;
                entry.insert(next.clone());
                Ok(next)
            }
            Entry::Vacant(entry) => {
                check_condition(condition, key, None)?;
                let mut next = Item::new(key.clone());
                apply_all(&mut next, actions)?;
                entry.insert(next.clone());
                Ok(next)
            }
        }
    }

    async fn delete(&self, key: &ItemKey, condition: Option<&Condition>) -> Result<()> {
        debug!("delete {}", key);
        match self.items.entry(key.clone()) {
            Entry::Occupied(entry) => {
                check_condition(condition, key, Some(entry.get()))?;
                entry.remove();
            }
            Entry::Vacant(_) => {
                check_condition(condition, key, None)?;
            }
        }
        Ok(())
    }
}

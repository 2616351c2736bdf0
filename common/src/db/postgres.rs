//! PostgreSQL-backed store
//!
//! All items live in one table keyed by `(partition_key, sort_key)` with the
//! attribute map in a JSONB column. Each conditional operation runs inside its
//! own transaction: the row is read with `SELECT ... FOR UPDATE`, the
//! condition is evaluated, and the write is committed while the row lock is
//! still held. Two writers racing to create the same vacant key meet on the
//! primary key; the loser retries once against the now-existing row.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

use crate::db::expression::{apply_all, Condition, UpdateAction};
use crate::db::item::{AttributeValue, Item, ItemKey};
use crate::db::{check_condition, Consistency, KeyValueStore};
use crate::error::{Error, Result};

type Attributes = BTreeMap<String, AttributeValue>;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS ledger_items (
    partition_key TEXT NOT NULL,
    sort_key TEXT NOT NULL,
    attributes JSONB NOT NULL,
    PRIMARY KEY (partition_key, sort_key)
)";

/// Attempts for a write that may collide on the primary key of a vacant row
const WRITE_ATTEMPTS: usize = 2;

/// What to do with the locked row once the condition holds
enum Write {
    Upsert(Attributes),
    Remove,
}

/// PostgreSQL key-value store
#[derive(Debug, Clone)]
pub struct PostgresStore {
    /// Database connection pool
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, then make sure the items table exists
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        info!("Connecting to PostgreSQL database with pool size: {}", max_connections);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(Error::Database)?;

        let store = Self::new(pool);
        store.ensure_schema().await?;

        info!("Connected to PostgreSQL database");
        Ok(store)
    }

    /// Create the items table if it is missing
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    async fn lock_row(tx: &mut Transaction<'static, Postgres>, key: &ItemKey) -> Result<Option<Item>> {
        let row = sqlx::query(
            "SELECT attributes FROM ledger_items
             WHERE partition_key = $1 AND sort_key = $2
             FOR UPDATE",
        )
        .bind(&key.partition)
        .bind(&key.sort)
        .fetch_optional(&mut **tx)
        .await?;

        match row {
            Some(row) => {
                let Json(attributes): Json<Attributes> = row.try_get("attributes")?;
                Ok(Some(Item {
                    key: key.clone(),
                    attributes,
                }))
            }
            None => Ok(None),
        }
    }

    async fn write_row(
        tx: &mut Transaction<'static, Postgres>,
        key: &ItemKey,
        existed: bool,
        write: &Write,
    ) -> Result<()> {
        match write {
            Write::Upsert(attributes) if existed => {
                sqlx::query(
                    "UPDATE ledger_items SET attributes = $3
                     WHERE partition_key = $1 AND sort_key = $2",
                )
                .bind(&key.partition)
                .bind(&key.sort)
                .bind(Json(attributes))
                .execute(&mut **tx)
                .await?;
            }
            Write::Upsert(attributes) => {
                sqlx::query(
                    "INSERT INTO ledger_items (partition_key, sort_key, attributes)
                     VALUES ($1, $2, $3)",
                )
                .bind(&key.partition)
                .bind(&key.sort)
                .bind(Json(attributes))
                .execute(&mut **tx)
                .await?;
            }
            Write::Remove if existed => {
                sqlx::query("DELETE FROM ledger_items WHERE partition_key = $1 AND sort_key = $2")
                    .bind(&key.partition)
                    .bind(&key.sort)
                    .execute(&mut **tx)
                    .await?;
            }
            Write::Remove => {}
        }
        Ok(())
    }

    /// Lock the row, check the condition, compute and apply the write, commit.
    ///
    /// `plan` maps the current item to the write to perform and the item to
    /// return.
    async fn conditional<F>(
        &self,
        key: &ItemKey,
        condition: Option<&Condition>,
        plan: F,
    ) -> Result<Option<Item>>
    where
        F: Fn(Option<&Item>) -> Result<(Write, Option<Item>)> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut tx = self.pool.begin().await?;

            let current = Self::lock_row(&mut tx, key).await?;
            check_condition(condition, key, current.as_ref())?;
            let (write, result) = plan(current.as_ref())?;

            match Self::write_row(&mut tx, key, current.is_some(), &write).await {
                Ok(()) => {
                    tx.commit().await?;
                    return Ok(result);
                }
                Err(Error::Database(e)) if is_unique_violation(&e) && attempt < WRITE_ATTEMPTS => {
                    debug!("Concurrent insert on {}, retrying", key);
                    tx.rollback().await?;
                }
                Err(Error::Database(e)) if is_unique_violation(&e) => {
                    return Err(Error::ConditionFailed(format!("{} was created concurrently", key)));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl KeyValueStore for PostgresStore {
    async fn put(&self, item: Item, condition: Option<&Condition>) -> Result<()> {
        debug!("Putting item in database: {}", item.key);
        let attributes = item.attributes.clone();
        self.conditional(&item.key, condition, |_| Ok((Write::Upsert(attributes.clone()), None)))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &ItemKey, consistency: Consistency) -> Result<Option<Item>> {
        // Reads go to the primary, so every read is strongly consistent.
        debug!("Getting item from database: {} ({:?})", key, consistency);

        let row = sqlx::query(
            "SELECT attributes FROM ledger_items WHERE partition_key = $1 AND sort_key = $2",
        )
        .bind(&key.partition)
        .bind(&key.sort)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let Json(attributes): Json<Attributes> = row.try_get("attributes")?;
                Ok(Some(Item {
                    key: key.clone(),
                    attributes,
                }))
            }
            None => Ok(None),
        }
    }

    async fn query(
        &self,
        partition: &str,
        sort_prefix: &str,
        filter: Option<&Condition>,
    ) -> Result<Vec<Item>> {
        debug!("Querying items in database: {} {}*", partition, sort_prefix);

        let rows = sqlx::query(
            "SELECT sort_key, attributes FROM ledger_items
             WHERE partition_key = $1 AND left(sort_key, length($2)) = $2
             ORDER BY sort_key",
        )
        .bind(partition)
        .bind(sort_prefix)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let sort: String = row.try_get("sort_key")?;
            let Json(attributes): Json<Attributes> = row.try_get("attributes")?;
            let item = Item {
                key: ItemKey::new(partition, sort),
                attributes,
            };
            if filter.map_or(true, |f| f.evaluate(Some(&item))) {
                items.push(item);
            }
        }

        Ok(items)
    }

    async fn update(
        &self,
        key: &ItemKey,
        actions: &[UpdateAction],
        condition: Option<&Condition>,
    ) -> Result<Item> {
        debug!("Updating item in database: {} with {} action(s)", key, actions.len());

        let updated = self
            .conditional(key, condition, |current| {
                let mut next = current.cloned().unwrap_or_else(|| Item::new(key.clone()));
                apply_all(&mut next, actions)?;
                Ok((Write::Upsert(next.attributes.clone()), Some(next)))
            })
            .await?;

        updated.ok_or_else(|| Error::Internal(format!("Update of {} returned no item", key)))
    }

    async fn delete(&self, key: &ItemKey, condition: Option<&Condition>) -> Result<()> {
        debug!("Deleting item from database: {}", key);
        self.conditional(key, condition, |_| Ok((Write::Remove, None))).await?;
        Ok(())
    }
}

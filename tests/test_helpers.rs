// File: tests/test_helpers.rs

use std::env;
use std::sync::Arc;
use std::time::Duration;

use account_service::{AccountService, AccountServiceConfig};
use common::db::{InMemoryStore, KeyValueStore, PostgresStore};
use uuid::Uuid;

// Limits and timeouts used by every scenario, independent of the environment
#[allow(dead_code)]
pub fn scenario_config() -> AccountServiceConfig {
    let mut config = AccountServiceConfig::new("postgres://unused".to_string(), 2);
    config.store_timeout = Duration::from_secs(5);
    config.reservation_grace = Duration::from_secs(10);
    config.transactions_url = None;
    config.checking_limit = 50;
    config.saving_limit = 10;
    config
}

// Service over a fresh in-memory store
#[allow(dead_code)]
pub fn in_memory_service() -> AccountService {
    let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    AccountService::with_store(store, &scenario_config())
}

// Random owner so scenarios never share a partition
pub fn fresh_owner() -> String {
    Uuid::new_v4().to_string()
}

// Connect to the test database, or None when TEST_DATABASE_URL is not set
#[allow(dead_code)]
pub async fn postgres_store() -> Option<PostgresStore> {
    let db_url = match env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            println!("Skipping database test: TEST_DATABASE_URL not set");
            return None;
        }
    };

    match PostgresStore::connect(&db_url, 5).await {
        Ok(store) => Some(store),
        Err(err) => {
            println!("Skipping database test: could not connect to database: {}", err);
            None
        }
    }
}

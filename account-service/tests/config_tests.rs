use std::sync::Arc;

use account_service::{AccountService, AccountServiceConfig, RepositoryType};
use common::db::InMemoryStore;
use common::error::Error;
use common::model::account::ListFilter;
use uuid::Uuid;

// Own test binary: these tests change the process environment

#[tokio::test]
async fn test_repository_constructor_attaches_configured_transactions() {
    std::env::set_var("TRANSACTIONS_URL", "http://transactions.invalid:8080");

    let service = AccountService::with_repository(RepositoryType::InMemory).await.unwrap();
    assert!(service.has_transaction_source());

    // No accounts means no upstream calls, only the configuration check
    let listed = service
        .list_accounts_with_transactions(&Uuid::new_v4().to_string(), ListFilter::All, "Bearer token")
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[test]
fn test_configured_transactions_follow_config() {
    let mut config = AccountServiceConfig::new("postgres://unused".to_string(), 1);

    config.transactions_url = None;
    let bare = AccountService::with_store(Arc::new(InMemoryStore::new()), &config)
        .with_configured_transactions(&config)
        .unwrap();
    assert!(!bare.has_transaction_source());

    config.transactions_url = Some("http://transactions:8080/".to_string());
    let wired = AccountService::with_store(Arc::new(InMemoryStore::new()), &config)
        .with_configured_transactions(&config)
        .unwrap();
    assert!(wired.has_transaction_source());
}

#[tokio::test]
async fn test_listing_without_transactions_service() {
    let mut config = AccountServiceConfig::new("postgres://unused".to_string(), 1);
    config.transactions_url = None;

    let service = AccountService::with_store(Arc::new(InMemoryStore::new()), &config)
        .with_configured_transactions(&config)
        .unwrap();
    let result = service
        .list_accounts_with_transactions(&Uuid::new_v4().to_string(), ListFilter::All, "Bearer token")
        .await;
    assert!(matches!(result, Err(Error::ConfigurationError(_))));
}

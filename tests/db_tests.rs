// Store-level persistence tests against PostgreSQL
// Run with: TEST_DATABASE_URL=... cargo test --features db_tests --test db_tests

#![cfg(feature = "db_tests")]

mod test_helpers;

use std::sync::Arc;

use common::db::{Condition, Consistency, Item, ItemKey, KeyValueStore, UpdateAction};
use common::decimal::dec;
use common::error::Error;
use test_helpers::{fresh_owner, postgres_store};

fn key(owner: &str, sort: &str) -> ItemKey {
    ItemKey::new(format!("USER#{}", owner), sort)
}

#[tokio::test]
async fn test_conditional_put_and_get() {
    let Some(store) = postgres_store().await else { return };
    let owner = fresh_owner();
    let absent = Condition::not_exists("id");

    let item = Item::new(key(&owner, "ACCOUNT#a")).with("id", "a").with("balance", dec!(1.5));
    store.put(item.clone(), Some(&absent)).await.unwrap();

    let second = store.put(item.clone(), Some(&absent)).await;
    assert!(matches!(second, Err(Error::ConditionFailed(_))));

    let stored = store.get(&item.key, Consistency::Strong).await.unwrap();
    assert_eq!(stored, Some(item.clone()));

    store.delete(&item.key, None).await.unwrap();
}

#[tokio::test]
async fn test_query_by_prefix() {
    let Some(store) = postgres_store().await else { return };
    let owner = fresh_owner();

    for sort in ["ACCOUNT#b", "TYPE#checking", "ACCOUNT#a"] {
        store.put(Item::new(key(&owner, sort)), None).await.unwrap();
    }
    store
        .put(Item::new(key(&owner, "ACCOUNT#c")).with("closedAt", "2024-01-01T00:00:00Z"), None)
        .await
        .unwrap();

    let items = store.query(&format!("USER#{}", owner), "ACCOUNT#", None).await.unwrap();
    let sorts: Vec<&str> = items.iter().map(|i| i.key.sort.as_str()).collect();
    assert_eq!(sorts, vec!["ACCOUNT#a", "ACCOUNT#b", "ACCOUNT#c"]);

    let closed = Condition::exists("closedAt");
    let items = store
        .query(&format!("USER#{}", owner), "ACCOUNT#", Some(&closed))
        .await
        .unwrap();
    assert_eq!(items.len(), 1);

    for sort in ["ACCOUNT#a", "ACCOUNT#b", "ACCOUNT#c", "TYPE#checking"] {
        store.delete(&key(&owner, sort), None).await.unwrap();
    }
}

#[tokio::test]
async fn test_update_does_not_create_on_failed_condition() {
    let Some(store) = postgres_store().await else { return };
    let owner = fresh_owner();
    let missing = key(&owner, "ACCOUNT#missing");

    let must_exist = Condition::exists("id");
    let result = store
        .update(&missing, &[UpdateAction::add("balance", dec!(5))], Some(&must_exist))
        .await;

    assert!(matches!(result, Err(Error::ConditionFailed(_))));
    assert!(store.get(&missing, Consistency::Strong).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_are_atomic() {
    let Some(store) = postgres_store().await else { return };
    let store = Arc::new(store);
    let owner = fresh_owner();
    let counter = key(&owner, "ACCOUNT#counter");

    store
        .put(Item::new(counter.clone()).with("balance", dec!(0)), None)
        .await
        .unwrap();

    let adds = (0..20).map(|_| {
        let store = Arc::clone(&store);
        let counter = counter.clone();
        tokio::spawn(async move {
            store
                .update(&counter, &[UpdateAction::add("balance", dec!(2.5))], None)
                .await
        })
    });
    for joined in futures::future::join_all(adds).await {
        joined.unwrap().unwrap();
    }

    let item = store.get(&counter, Consistency::Strong).await.unwrap().unwrap();
    assert_eq!(item.get_number("balance").unwrap(), dec!(50));

    store.delete(&counter, None).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_creates_of_vacant_key() {
    let Some(store) = postgres_store().await else { return };
    let store = Arc::new(store);
    let owner = fresh_owner();
    let slot = key(&owner, "TYPE#checking");

    let puts = (0..8).map(|i| {
        let store = Arc::clone(&store);
        let item = Item::new(slot.clone()).with("accountId", format!("holder-{}", i));
        tokio::spawn(async move {
            let vacant = Condition::not_exists("accountId");
            store.put(item, Some(&vacant)).await
        })
    });

    let mut won = 0;
    for joined in futures::future::join_all(puts).await {
        match joined.unwrap() {
            Ok(()) => won += 1,
            Err(Error::ConditionFailed(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(won, 1);

    store.delete(&slot, None).await.unwrap();
}

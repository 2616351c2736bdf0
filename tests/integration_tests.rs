// File: tests/integration_tests.rs

mod test_helpers;

use common::decimal::dec;
use common::error::Error;
use common::model::account::{AccountType, ListFilter};
use test_helpers::{fresh_owner, in_memory_service};

#[tokio::test]
async fn test_account_lifecycle_walkthrough() {
    let service = in_memory_service();
    let owner = fresh_owner();

    // Open one account of each type
    let checking = service.create_account(&owner, "checking").await.unwrap();
    let saving = service.create_account(&owner, "saving").await.unwrap();
    assert_eq!(checking.account_type, AccountType::Checking);
    assert_eq!(saving.account_type, AccountType::Saving);

    let checking_id = checking.id.to_string();
    let saving_id = saving.id.to_string();

    // Fund and overdraw the checking account
    service.deposit(&owner, &checking_id, dec!(45.12)).await.unwrap();
    let checking = service.withdraw(&owner, &checking_id, dec!(90)).await.unwrap();
    assert_eq!(checking.balance, dec!(-44.88));

    let refused = service.withdraw(&owner, &checking_id, dec!(10)).await;
    assert!(matches!(refused, Err(Error::InsufficientFunds(_))));

    // A second saving account waits until the first is closed
    let blocked = service.create_account(&owner, "saving").await;
    assert!(matches!(blocked, Err(Error::AlreadyExists(_))));

    service.close_account(&owner, &saving_id).await.unwrap();
    let replacement = service.create_account(&owner, "saving").await.unwrap();

    // Closed accounts can be deleted, open ones cannot
    let still_open = service.delete_account(&owner, &checking_id).await;
    assert!(matches!(still_open, Err(Error::OpenAccount(_))));
    service.delete_account(&owner, &saving_id).await.unwrap();

    let all = service.list_accounts(&owner, ListFilter::All).await.unwrap();
    let mut ids: Vec<_> = all.iter().map(|a| a.id).collect();
    ids.sort();
    let mut expected = vec![checking.id, replacement.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_balances_survive_a_closed_account() {
    let service = in_memory_service();
    let owner = fresh_owner();

    let account = service.create_account(&owner, "saving").await.unwrap();
    let id = account.id.to_string();

    service.deposit(&owner, &id, dec!(100)).await.unwrap();
    service.withdraw(&owner, &id, dec!(30.5)).await.unwrap();
    let closed = service.close_account(&owner, &id).await.unwrap();
    assert_eq!(closed.balance, dec!(69.5));

    let late_deposit = service.deposit(&owner, &id, dec!(1)).await;
    assert!(matches!(late_deposit, Err(Error::InvalidAccount(_))));

    let listed = service.list_accounts(&owner, ListFilter::Closed).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].balance, dec!(69.5));
    assert_eq!(listed[0].closed_at, closed.closed_at);
}

#[tokio::test]
async fn test_owners_are_isolated() {
    let service = in_memory_service();
    let alice = fresh_owner();
    let bob = fresh_owner();

    let account = service.create_account(&alice, "checking").await.unwrap();
    let id = account.id.to_string();

    // Bob can neither see nor touch Alice's account
    assert!(matches!(service.get_account(&bob, &id).await, Err(Error::NotFound(_))));
    assert!(matches!(service.deposit(&bob, &id, dec!(5)).await, Err(Error::InvalidAccount(_))));
    assert!(matches!(service.withdraw(&bob, &id, dec!(5)).await, Err(Error::InvalidAccount(_))));
    assert!(matches!(service.close_account(&bob, &id).await, Err(Error::InvalidAccount(_))));

    // And Bob's own checking slot is free
    service.create_account(&bob, "checking").await.unwrap();
    assert!(service.list_accounts(&alice, ListFilter::Open).await.unwrap().len() == 1);
}

#[tokio::test]
async fn test_account_json_shape() {
    let service = in_memory_service();
    let owner = fresh_owner();

    let account = service.create_account(&owner, "checking").await.unwrap();
    let json = serde_json::to_value(&account).unwrap();

    assert_eq!(json["owner"], owner.as_str());
    assert_eq!(json["type"], "checking");
    assert_eq!(json["limit"], 50);
    assert!(json.get("openedAt").is_some());
    assert!(json.get("closedAt").is_none());

    let closed = service.close_account(&owner, &account.id.to_string()).await.unwrap();
    let json = serde_json::to_value(&closed).unwrap();
    assert!(json.get("closedAt").is_some());
}

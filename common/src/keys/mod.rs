//! Composite key derivation
//!
//! Every ledger record lives under a `(partition, sort)` key. The partition is
//! the owner key; the sort key says what kind of record it is. Tags end in `#`
//! and raw identifiers may not contain `#`, so a tagged key can never be
//! mistaken for a raw one.

use crate::db::ItemKey;
use crate::model::account::AccountType;

/// Tag for owner partition keys
pub const OWNER_PREFIX: &str = "USER#";
/// Tag for account sort keys
pub const ACCOUNT_PREFIX: &str = "ACCOUNT#";
/// Tag for type-slot sort keys
pub const SLOT_PREFIX: &str = "TYPE#";

fn tagged(prefix: &str, id: &str) -> String {
    if id.starts_with(prefix) {
        id.to_string()
    } else {
        format!("{}{}", prefix, id)
    }
}

/// Owner partition key, e.g. `USER#6204037c-...`
pub fn owner_key(user_id: &str) -> String {
    tagged(OWNER_PREFIX, user_id)
}

/// Account sort key, e.g. `ACCOUNT#09130407-...`
pub fn account_key(account_id: &str) -> String {
    tagged(ACCOUNT_PREFIX, account_id)
}

/// Sort key of the slot that reserves "the open account of this type"
pub fn slot_key(account_type: AccountType) -> String {
    format!("{}{}", SLOT_PREFIX, account_type.as_str())
}

/// Strip a known tag from a key, returning the raw identifier
pub fn raw_id(key: &str) -> &str {
    [OWNER_PREFIX, ACCOUNT_PREFIX, SLOT_PREFIX]
        .iter()
        .find_map(|prefix| key.strip_prefix(prefix))
        .unwrap_or(key)
}

/// Full key of an account record
pub fn account_item_key(user_id: &str, account_id: &str) -> ItemKey {
    ItemKey::new(owner_key(user_id), account_key(account_id))
}

/// Full key of a type slot record
pub fn slot_item_key(user_id: &str, account_type: AccountType) -> ItemKey {
    ItemKey::new(owner_key(user_id), slot_key(account_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagging_is_idempotent() {
        let once = owner_key("6204037c");
        assert_eq!(once, "USER#6204037c");
        assert_eq!(owner_key(&once), once);

        let once = account_key("09130407");
        assert_eq!(once, "ACCOUNT#09130407");
        assert_eq!(account_key(&once), once);
    }

    #[test]
    fn test_raw_and_tagged_normalise_to_same_key() {
        assert_eq!(
            account_item_key("u1", "a1"),
            account_item_key("USER#u1", "ACCOUNT#a1")
        );
    }

    #[test]
    fn test_raw_id() {
        assert_eq!(raw_id("USER#u1"), "u1");
        assert_eq!(raw_id("ACCOUNT#a1"), "a1");
        assert_eq!(raw_id("plain"), "plain");
        assert_eq!(slot_key(AccountType::Saving), "TYPE#saving");
    }
}

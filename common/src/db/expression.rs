//! Condition and update expressions evaluated by the store

use std::fmt;

use rust_decimal::Decimal;

use crate::db::item::{AttributeValue, Item};
use crate::error::{Error, Result};

/// Predicate over the current state of a single item
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Attribute is present
    Exists(String),
    /// Attribute is absent (also true when there is no item at all)
    NotExists(String),
    /// Attribute equals the value
    Equals(String, AttributeValue),
    /// Numeric attribute is greater than or equal to the value
    AtLeast(String, Decimal),
    /// Every inner condition holds
    And(Vec<Condition>),
}

impl Condition {
    pub fn exists(name: &str) -> Self {
        Condition::Exists(name.to_string())
    }

    pub fn not_exists(name: &str) -> Self {
        Condition::NotExists(name.to_string())
    }

    pub fn equals(name: &str, value: impl Into<AttributeValue>) -> Self {
        Condition::Equals(name.to_string(), value.into())
    }

    pub fn at_least(name: &str, value: Decimal) -> Self {
        Condition::AtLeast(name.to_string(), value)
    }

    /// Conjunction, flattening nested `And`s
    pub fn and(self, other: Condition) -> Self {
        let mut parts = match self {
            Condition::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Condition::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Condition::And(parts)
    }

    /// Evaluate against the current item, `None` meaning the key is vacant
    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        match self {
            Condition::Exists(name) => item.map_or(false, |i| i.contains(name)),
            Condition::NotExists(name) => item.map_or(true, |i| !i.contains(name)),
            Condition::Equals(name, value) => item
                .and_then(|i| i.get(name))
                .map_or(false, |current| current == value),
            Condition::AtLeast(name, value) => item
                .and_then(|i| i.get(name))
                .and_then(AttributeValue::as_number)
                .map_or(false, |current| current >= *value),
            Condition::And(parts) => parts.iter().all(|c| c.evaluate(item)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Exists(name) => write!(f, "attribute_exists({})", name),
            Condition::NotExists(name) => write!(f, "attribute_not_exists({})", name),
            Condition::Equals(name, value) => write!(f, "{} = {}", name, value),
            Condition::AtLeast(name, value) => write!(f, "{} >= {}", name, value),
            Condition::And(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" AND ")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
        }
    }
}

/// A single mutation applied by an update
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Overwrite (or create) an attribute
    Set(String, AttributeValue),
    /// Add to a numeric attribute; an absent attribute counts as zero
    Add(String, Decimal),
}

impl UpdateAction {
    pub fn set(name: &str, value: impl Into<AttributeValue>) -> Self {
        UpdateAction::Set(name.to_string(), value.into())
    }

    pub fn add(name: &str, delta: Decimal) -> Self {
        UpdateAction::Add(name.to_string(), delta)
    }

    pub fn apply(&self, item: &mut Item) -> Result<()> {
        match self {
            UpdateAction::Set(name, value) => {
                item.set(name, value.clone());
            }
            UpdateAction::Add(name, delta) => {
                let current = match item.get(name) {
                    None => Decimal::ZERO,
                    Some(value) => value.as_number().ok_or_else(|| {
                        Error::Internal(format!("Cannot add to non-numeric attribute {} of {}", name, item.key))
                    })?,
                };
                let next = current.checked_add(*delta).ok_or_else(|| {
                    Error::DecimalError(format!("Overflow adding {} to {} of {}", delta, name, item.key))
                })?;
                item.set(name, next);
            }
        }
        Ok(())
    }
}

/// Apply a list of actions in order
pub fn apply_all(item: &mut Item, actions: &[UpdateAction]) -> Result<()> {
    for action in actions {
        action.apply(item)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::item::ItemKey;
    use crate::decimal::dec;

    fn account_item() -> Item {
        Item::new(ItemKey::new("USER#u1", "ACCOUNT#a1"))
            .with("owner", "u1")
            .with("balance", dec!(10))
    }

    #[test]
    fn test_conditions_on_vacant_key() {
        assert!(Condition::not_exists("id").evaluate(None));
        assert!(!Condition::exists("id").evaluate(None));
        assert!(!Condition::equals("owner", "u1").evaluate(None));
        assert!(!Condition::at_least("balance", dec!(0)).evaluate(None));
    }

    #[test]
    fn test_conditions_on_item() {
        let item = account_item();
        let cond = Condition::equals("owner", "u1")
            .and(Condition::not_exists("closedAt"))
            .and(Condition::at_least("balance", dec!(10)));

        assert!(cond.evaluate(Some(&item)));
        assert!(!Condition::at_least("balance", dec!(10.01)).evaluate(Some(&item)));
        assert!(!Condition::equals("owner", "u2").evaluate(Some(&item)));
        assert!(!Condition::equals("balance", "10").evaluate(Some(&item)));
        assert_eq!(
            cond.to_string(),
            "owner = \"u1\" AND attribute_not_exists(closedAt) AND balance >= 10"
        );
    }

    #[test]
    fn test_update_actions() {
        let mut item = account_item();
        apply_all(
            &mut item,
            &[
                UpdateAction::add("balance", dec!(-54.88)),
                UpdateAction::add("fresh", dec!(1)),
                UpdateAction::set("type", "checking"),
            ],
        )
        .unwrap();

        assert_eq!(item.get_number("balance").unwrap(), dec!(-44.88));
        assert_eq!(item.get_number("fresh").unwrap(), dec!(1));
        assert_eq!(item.get_str("type").unwrap(), "checking");
        assert!(UpdateAction::add("type", dec!(1)).apply(&mut item).is_err());
    }
}

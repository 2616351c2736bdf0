//! Store items: flat attribute maps under a two-part key

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Two-part composite key: owner partition plus record sort key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub partition: String,
    pub sort: String,
}

impl ItemKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.partition, self.sort)
    }
}

/// Attribute value. Numbers are exact decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValue {
    S(String),
    N(Decimal),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            AttributeValue::N(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            AttributeValue::N(n) => Some(*n),
            AttributeValue::S(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::S(s) => write!(f, "{:?}", s),
            AttributeValue::N(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::S(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::S(s)
    }
}

impl From<Decimal> for AttributeValue {
    fn from(n: Decimal) -> Self {
        AttributeValue::N(n)
    }
}

impl From<u32> for AttributeValue {
    fn from(n: u32) -> Self {
        AttributeValue::N(Decimal::from(n))
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(ts: DateTime<Utc>) -> Self {
        AttributeValue::S(ts.to_rfc3339())
    }
}

/// A stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub key: ItemKey,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Item {
    /// Empty item under `key`
    pub fn new(key: ItemKey) -> Self {
        Self {
            key,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Required string attribute
    pub fn get_str(&self, name: &str) -> Result<&str> {
        self.get(name)
            .and_then(AttributeValue::as_str)
            .ok_or_else(|| self.missing(name, "string"))
    }

    /// Required numeric attribute
    pub fn get_number(&self, name: &str) -> Result<Decimal> {
        self.get(name)
            .and_then(AttributeValue::as_number)
            .ok_or_else(|| self.missing(name, "number"))
    }

    /// Required RFC 3339 timestamp attribute
    pub fn get_timestamp(&self, name: &str) -> Result<DateTime<Utc>> {
        let raw = self.get_str(name)?;
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| Error::Internal(format!("Invalid timestamp in {} of {}: {}", name, self.key, e)))
    }

    /// Optional RFC 3339 timestamp attribute
    pub fn get_optional_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        if self.contains(name) {
            self.get_timestamp(name).map(Some)
        } else {
            Ok(None)
        }
    }

    fn missing(&self, name: &str, kind: &str) -> Error {
        Error::Internal(format!("Item {} has no {} attribute {}", self.key, kind, name))
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Attribute holding the partition key on every item.
pub const PARTITION_KEY: &str = "PK";
/// Attribute holding the sort key on every item.
pub const SORT_KEY: &str = "SK";

/// Upper bound on writes in one transaction.
pub const MAX_TRANSACT_ITEMS: usize = 100;

/// A single attribute value. Serialized with the type tag as the key,
/// e.g. `{"S":"abc"}` or `{"BOOL":true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    /// Numbers are kept as their decimal text.
    N(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
}

impl AttributeValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::S(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::S(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A stored row: attribute name to value.
pub type Item = BTreeMap<String, AttributeValue>;

/// Composite primary key of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    pub pk: String,
    pub sk: String,
}

impl Key {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Read the key attributes off an item.
    pub fn of(item: &Item) -> Result<Self, StoreError> {
        let pk = item
            .get(PARTITION_KEY)
            .and_then(AttributeValue::as_s)
            .ok_or_else(|| StoreError::Validation(format!("item is missing string attribute {PARTITION_KEY}")))?;
        let sk = item
            .get(SORT_KEY)
            .and_then(AttributeValue::as_s)
            .ok_or_else(|| StoreError::Validation(format!("item is missing string attribute {SORT_KEY}")))?;
        Ok(Self::new(pk, sk))
    }

    /// An item holding only the key attributes.
    pub fn to_item(&self) -> Item {
        Item::from([
            (PARTITION_KEY.to_string(), AttributeValue::S(self.pk.clone())),
            (SORT_KEY.to_string(), AttributeValue::S(self.sk.clone())),
        ])
    }
}

/// Precondition on the current state of the target item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// No item is stored under the key.
    NotExists,
    /// An item is stored under the key.
    Exists,
    /// The item exists and `attribute` equals `value`.
    Equals {
        attribute: String,
        value: AttributeValue,
    },
}

impl Condition {
    pub fn equals(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn holds(&self, current: Option<&Item>) -> bool {
        match self {
            Self::NotExists => current.is_none(),
            Self::Exists => current.is_some(),
            Self::Equals { attribute, value } => {
                current.and_then(|item| item.get(attribute)) == Some(value)
            }
        }
    }
}

/// One write of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Store `item`, replacing whatever is under its key.
    Put {
        item: Item,
        condition: Option<Condition>,
    },
    /// Set attributes on the item under `key`, creating it if absent.
    Update {
        key: Key,
        set: Item,
        condition: Option<Condition>,
    },
    /// Remove the item under `key`.
    Delete {
        key: Key,
        condition: Option<Condition>,
    },
}

impl WriteOp {
    pub fn key(&self) -> Result<Key, StoreError> {
        match self {
            Self::Put { item, .. } => Key::of(item),
            Self::Update { key, .. } | Self::Delete { key, .. } => Ok(key.clone()),
        }
    }

    fn condition(&self) -> Option<&Condition> {
        match self {
            Self::Put { condition, .. }
            | Self::Update { condition, .. }
            | Self::Delete { condition, .. } => condition.as_ref(),
        }
    }

    /// The item stored under the key once this write is applied to `current`.
    fn apply(self, current: Option<Item>) -> Result<Option<Item>, StoreError> {
        match self {
            Self::Put { item, .. } => Ok(Some(item)),
            Self::Delete { .. } => Ok(None),
            Self::Update { key, set, .. } => {
                if set.contains_key(PARTITION_KEY) || set.contains_key(SORT_KEY) {
                    return Err(StoreError::Validation(
                        "update cannot modify key attributes".into(),
                    ));
                }
                let mut item = current.unwrap_or_else(|| key.to_item());
                item.extend(set);
                Ok(Some(item))
            }
        }
    }
}

/// Per-write outcome reported when a transaction is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    None,
    ConditionalCheckFailed,
}

/// Before and after images of one key touched by a committed write.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub key: Key,
    pub old: Option<Item>,
    pub new: Option<Item>,
}

/// Check every condition against `current` (the stored items, one per op,
/// in op order) and compute the resulting changes. Nothing is returned for
/// application unless every condition holds.
pub(crate) fn plan_writes(
    ops: Vec<WriteOp>,
    current: Vec<Option<Item>>,
) -> Result<Vec<Change>, StoreError> {
    let reasons: Vec<CancellationReason> = ops
        .iter()
        .zip(&current)
        .map(|(op, item)| match op.condition() {
            Some(cond) if !cond.holds(item.as_ref()) => CancellationReason::ConditionalCheckFailed,
            _ => CancellationReason::None,
        })
        .collect();

    if reasons.contains(&CancellationReason::ConditionalCheckFailed) {
        return Err(StoreError::TransactionCanceled { reasons });
    }

    ops.into_iter()
        .zip(current)
        .map(|(op, old)| {
            let key = op.key()?;
            let new = op.apply(old.clone())?;
            Ok(Change { key, old, new })
        })
        .collect()
}

/// Reject empty, oversized or self-conflicting transactions.
pub(crate) fn check_transaction(ops: &[WriteOp]) -> Result<Vec<Key>, StoreError> {
    if ops.is_empty() || ops.len() > MAX_TRANSACT_ITEMS {
        return Err(StoreError::Validation(format!(
            "transaction must contain between 1 and {MAX_TRANSACT_ITEMS} writes, got {}",
            ops.len()
        )));
    }

    let keys = ops.iter().map(WriteOp::key).collect::<Result<Vec<_>, _>>()?;
    let mut seen = std::collections::BTreeSet::new();
    for key in &keys {
        if !seen.insert(key) {
            return Err(StoreError::Validation(format!(
                "transaction touches {}/{} more than once",
                key.pk, key.sk
            )));
        }
    }
    Ok(keys)
}

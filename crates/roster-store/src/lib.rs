//! Keyed item store with per-item conditional writes and all-or-nothing
//! multi-item transactions.
//!
//! Items live in named tables under a composite `(PK, SK)` key. Every write
//! may carry a [`Condition`] on the item currently stored under its key; a
//! failed condition rejects the write (or the whole transaction) without
//! side effects. Committed writes are published on a [`ChangeStream`].
//!
//! Two backends implement [`Store`]: [`SqliteStore`] for durable storage and
//! [`MemoryStore`] for tests and tooling.

pub mod item;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod stream;

use std::sync::Arc;

use async_trait::async_trait;

pub use item::{AttributeValue, CancellationReason, Condition, Item, Key, WriteOp};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use stream::{ChangeStream, StreamEvent, StreamRecord};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A single-item write was rejected by its condition.
    #[error("conditional check failed")]
    ConditionalCheckFailed,

    /// A transaction was rejected; `reasons` has one entry per write.
    #[error("transaction cancelled: {reasons:?}")]
    TransactionCanceled { reasons: Vec<CancellationReason> },

    /// The request itself is malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The backend could not serve the request right now (busy, locked).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("item encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// True when a write or transaction was rejected by a condition, as
    /// opposed to failing for transport or backend reasons.
    pub fn is_condition_failure(&self) -> bool {
        matches!(
            self,
            Self::ConditionalCheckFailed | Self::TransactionCanceled { .. }
        )
    }
}

/// Capability set of the item store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Point read by composite key.
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError>;

    /// Every item of one partition, ordered by sort key.
    async fn query(&self, table: &str, partition: &str) -> Result<Vec<Item>, StoreError>;

    async fn put(
        &self,
        table: &str,
        item: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError>;

    async fn update(
        &self,
        table: &str,
        key: Key,
        set: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError>;

    async fn delete(
        &self,
        table: &str,
        key: Key,
        condition: Option<Condition>,
    ) -> Result<(), StoreError>;

    /// Apply every write or none of them.
    async fn transact_write(&self, table: &str, ops: Vec<WriteOp>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: Store + ?Sized> Store for Arc<S> {
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        (**self).get(table, key).await
    }

    async fn query(&self, table: &str, partition: &str) -> Result<Vec<Item>, StoreError> {
        (**self).query(table, partition).await
    }

    async fn put(
        &self,
        table: &str,
        item: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        (**self).put(table, item, condition).await
    }

    async fn update(
        &self,
        table: &str,
        key: Key,
        set: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        (**self).update(table, key, set, condition).await
    }

    async fn delete(
        &self,
        table: &str,
        key: Key,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        (**self).delete(table, key, condition).await
    }

    async fn transact_write(&self, table: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        (**self).transact_write(table, ops).await
    }
}

/// Single-item writes share the transaction path but report
/// [`StoreError::ConditionalCheckFailed`] instead of a cancellation.
pub(crate) fn single_write_error(err: StoreError) -> StoreError {
    match err {
        StoreError::TransactionCanceled { .. } => StoreError::ConditionalCheckFailed,
        other => other,
    }
}

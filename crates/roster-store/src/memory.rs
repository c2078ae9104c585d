use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::item::{self, Condition, Item, Key, WriteOp};
use crate::stream::{ChangeStream, StreamRecord};
use crate::{Store, StoreError, single_write_error};

type Table = BTreeMap<Key, Item>;

/// Process-local store. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tables: Mutex<HashMap<String, Table>>,
    stream: ChangeStream,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamRecord> {
        self.inner.stream.subscribe()
    }

    /// Number of items stored in `table`.
    pub fn len(&self, table: &str) -> Result<usize, StoreError> {
        self.with_tables(|tables| Ok(tables.get(table).map_or(0, BTreeMap::len)))
    }

    pub fn is_empty(&self, table: &str) -> Result<bool, StoreError> {
        self.len(table).map(|n| n == 0)
    }

    fn with_tables<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut HashMap<String, Table>) -> Result<T, StoreError>,
    {
        let mut tables = self.inner.tables.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut tables)
    }

    fn write(&self, table: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let keys = item::check_transaction(&ops)?;

        self.with_tables(|tables| {
            let rows = tables.entry(table.to_string()).or_default();
            let current = keys.iter().map(|key| rows.get(key).cloned()).collect();
            let changes = item::plan_writes(ops, current)?;

            for change in &changes {
                match &change.new {
                    Some(new) => rows.insert(change.key.clone(), new.clone()),
                    None => rows.remove(&change.key),
                };
            }

            // Published under the lock so subscribers see commit order
            self.inner.stream.publish(table, changes);
            Ok(())
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        self.with_tables(|tables| Ok(tables.get(table).and_then(|rows| rows.get(key)).cloned()))
    }

    async fn query(&self, table: &str, partition: &str) -> Result<Vec<Item>, StoreError> {
        self.with_tables(|tables| {
            let Some(rows) = tables.get(table) else {
                return Ok(vec![]);
            };
            Ok(rows
                .range(Key::new(partition, "")..)
                .take_while(|(key, _)| key.pk == partition)
                .map(|(_, item)| item.clone())
                .collect())
        })
    }

    async fn put(
        &self,
        table: &str,
        item: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        self.write(table, vec![WriteOp::Put { item, condition }])
            .map_err(single_write_error)
    }

    async fn update(
        &self,
        table: &str,
        key: Key,
        set: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        self.write(table, vec![WriteOp::Update { key, set, condition }])
            .map_err(single_write_error)
    }

    async fn delete(
        &self,
        table: &str,
        key: Key,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        self.write(table, vec![WriteOp::Delete { key, condition }])
            .map_err(single_write_error)
    }

    async fn transact_write(&self, table: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.write(table, ops)
    }
}

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::item::{self, Condition, Item, Key, WriteOp};
use crate::stream::{ChangeStream, StreamRecord};
use crate::{Store, StoreError, migrations, single_write_error};

/// SQLite-backed store. Every logical table shares the `items` relation,
/// one row per item with the item encoded as JSON.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<SqliteInner>,
}

struct SqliteInner {
    conn: Mutex<Connection>,
    stream: ChangeStream,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent readers from other processes
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let store = Self::from_connection(conn)?;
        info!("Store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        migrations::run(&conn)?;
        Ok(Self {
            inner: Arc::new(SqliteInner {
                conn: Mutex::new(conn),
                stream: ChangeStream::new(),
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamRecord> {
        self.inner.stream.subscribe()
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.inner.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut conn).map_err(classify)
    }

    /// Run blocking SQLite work off the async runtime.
    async fn blocking<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&SqliteStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {e}")))?
    }

    fn write(&self, table: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let keys = item::check_transaction(&ops)?;

        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let current = keys
                .iter()
                .map(|key| select_item(&tx, table, key))
                .collect::<Result<Vec<_>, _>>()?;

            // Dropping `tx` on a failed condition rolls back
            let changes = item::plan_writes(ops, current)?;

            for change in &changes {
                match &change.new {
                    Some(new) => upsert_item(&tx, table, &change.key, new)?,
                    None => delete_item(&tx, table, &change.key)?,
                }
            }
            tx.commit()?;

            debug!(table, writes = changes.len(), "Committed write");
            self.inner.stream.publish(table, changes);
            Ok(())
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        let (table, key) = (table.to_string(), key.clone());
        self.blocking(move |store| store.with_conn(|conn| select_item(conn, &table, &key)))
            .await
    }

    async fn query(&self, table: &str, partition: &str) -> Result<Vec<Item>, StoreError> {
        let (table, partition) = (table.to_string(), partition.to_string());
        self.blocking(move |store| store.with_conn(|conn| select_partition(conn, &table, &partition)))
            .await
    }

    async fn put(
        &self,
        table: &str,
        item: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        self.transact_write(table, vec![WriteOp::Put { item, condition }])
            .await
            .map_err(single_write_error)
    }

    async fn update(
        &self,
        table: &str,
        key: Key,
        set: Item,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        self.transact_write(table, vec![WriteOp::Update { key, set, condition }])
            .await
            .map_err(single_write_error)
    }

    async fn delete(
        &self,
        table: &str,
        key: Key,
        condition: Option<Condition>,
    ) -> Result<(), StoreError> {
        self.transact_write(table, vec![WriteOp::Delete { key, condition }])
            .await
            .map_err(single_write_error)
    }

    async fn transact_write(&self, table: &str, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        let table = table.to_string();
        self.blocking(move |store| store.write(&table, ops)).await
    }
}

fn select_item(conn: &Connection, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
    let json: Option<String> = conn
        .query_row(
            "SELECT item FROM items WHERE table_name = ?1 AND pk = ?2 AND sk = ?3",
            (table, &key.pk, &key.sk),
            |row| row.get(0),
        )
        .optional()?;

    json.map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(StoreError::from)
}

fn select_partition(conn: &Connection, table: &str, partition: &str) -> Result<Vec<Item>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT item FROM items WHERE table_name = ?1 AND pk = ?2 ORDER BY sk")?;

    let rows = stmt
        .query_map((table, partition), |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    rows.iter()
        .map(|json| serde_json::from_str(json).map_err(StoreError::from))
        .collect()
}

fn upsert_item(conn: &Connection, table: &str, key: &Key, item: &Item) -> Result<(), StoreError> {
    let json = serde_json::to_string(item)?;
    conn.execute(
        "INSERT INTO items (table_name, pk, sk, item) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (table_name, pk, sk)
         DO UPDATE SET item = excluded.item, updated_at = datetime('now')",
        (table, &key.pk, &key.sk, &json),
    )?;
    Ok(())
}

fn delete_item(conn: &Connection, table: &str, key: &Key) -> Result<(), StoreError> {
    conn.execute(
        "DELETE FROM items WHERE table_name = ?1 AND pk = ?2 AND sk = ?3",
        (table, &key.pk, &key.sk),
    )?;
    Ok(())
}

/// Lock contention is a transient condition, reported as `Unavailable`.
fn classify(err: StoreError) -> StoreError {
    match err {
        StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, msg))
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            StoreError::Unavailable(msg.unwrap_or_else(|| e.to_string()))
        }
        other => other,
    }
}

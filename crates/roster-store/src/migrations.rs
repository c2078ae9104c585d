use rusqlite::Connection;
use tracing::info;

use crate::StoreError;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS items (
            table_name  TEXT NOT NULL,
            pk          TEXT NOT NULL,
            sk          TEXT NOT NULL,
            item        TEXT NOT NULL,
            updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (table_name, pk, sk)
        ) WITHOUT ROWID;
        ",
    )?;

    info!("Store migrations complete");
    Ok(())
}

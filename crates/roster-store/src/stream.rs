use tokio::sync::broadcast;

use crate::item::{Change, Item, Key};

/// Kind of row change, named after the change-stream event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    Insert,
    Modify,
    Remove,
}

/// One committed row change.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub table: String,
    pub event: StreamEvent,
    pub keys: Key,
    pub new_image: Option<Item>,
    pub old_image: Option<Item>,
}

impl StreamRecord {
    fn from_change(table: &str, change: Change) -> Option<Self> {
        let event = match (&change.old, &change.new) {
            (None, Some(_)) => StreamEvent::Insert,
            (Some(_), Some(_)) => StreamEvent::Modify,
            (Some(_), None) => StreamEvent::Remove,
            (None, None) => return None,
        };
        Some(Self {
            table: table.to_string(),
            event,
            keys: change.key,
            new_image: change.new,
            old_image: change.old,
        })
    }
}

/// Fan-out of committed changes to any number of subscribers.
#[derive(Clone)]
pub struct ChangeStream {
    tx: broadcast::Sender<StreamRecord>,
}

impl ChangeStream {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamRecord> {
        self.tx.subscribe()
    }

    /// Publish the changes of one committed write, in write order.
    pub(crate) fn publish(&self, table: &str, changes: Vec<Change>) {
        for record in changes
            .into_iter()
            .filter_map(|change| StreamRecord::from_change(table, change))
        {
            // No subscribers is fine
            let _ = self.tx.send(record);
        }
    }
}

impl Default for ChangeStream {
    fn default() -> Self {
        Self::new()
    }
}

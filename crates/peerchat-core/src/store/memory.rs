//! In-memory document store with realtime fan-out.
//!
//! Documents live in per-collection vectors in insertion order. Every
//! mutation recomputes the ordered result for each watcher of the collection
//! and pushes it as a full snapshot.

use crate::core::{
    CollectionPath, Direction, Document, DocumentStore, Query, Result, SyncError, Unsubscribe,
    Watch,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Watcher {
    id: u64,
    query: Query,
    tx: async_channel::Sender<Result<Vec<Document>>>,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<CollectionPath, Vec<Document>>,
    watchers: HashMap<CollectionPath, Vec<Watcher>>,
    next_watch_id: u64,
}

impl StoreState {
    fn snapshot(&self, query: &Query) -> Vec<Document> {
        let mut docs = self
            .collections
            .get(&query.collection)
            .cloned()
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            // stable sort: equal keys keep insertion order
            docs.sort_by(|a, b| {
                let ord = compare_values(a.data.get(field), b.data.get(field));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        docs
    }

    fn notify(&mut self, collection: &CollectionPath) {
        let Some(watchers) = self.watchers.get(collection) else {
            return;
        };

        let mut closed = Vec::new();
        for watcher in watchers {
            let snapshot = self.snapshot(&watcher.query);
            if watcher.tx.try_send(Ok(snapshot)).is_err() {
                closed.push(watcher.id);
            }
        }

        if !closed.is_empty() {
            if let Some(watchers) = self.watchers.get_mut(collection) {
                watchers.retain(|w| !closed.contains(&w.id));
            }
            debug!("Dropped {} closed watchers on {}", closed.len(), collection);
        }
    }
}

/// Order of two field values: missing first, then by JSON type.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a, b) {
        (None, None) => CmpOrdering::Equal,
        (None, Some(_)) => CmpOrdering::Less,
        (Some(_), None) => CmpOrdering::Greater,
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).unwrap_or(CmpOrdering::Equal)
        }
        (Some(Value::Bool(a)), Some(Value::Bool(b))) => a.cmp(b),
        _ => CmpOrdering::Equal,
    }
}

/// Realtime document store held in process memory.
///
/// While `offline` is set every watch and write fails, as a disconnected
/// remote would.
#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        info!("Memory store {}", if offline { "offline" } else { "online" });
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Active watchers on `collection`.
    pub fn watcher_count(&self, collection: &CollectionPath) -> usize {
        self.state
            .lock()
            .watchers
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of documents in `collection`.
    pub fn document_count(&self, collection: &CollectionPath) -> usize {
        self.state
            .lock()
            .collections
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::Store("store unreachable".into()));
        }
        Ok(())
    }

    fn release(state: &Weak<Mutex<StoreState>>, collection: &CollectionPath, id: u64) {
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut state = state.lock();
        if let Some(watchers) = state.watchers.get_mut(collection) {
            watchers.retain(|w| w.id != id);
            if watchers.is_empty() {
                state.watchers.remove(collection);
            }
        }
        debug!("Released watcher {} on {}", id, collection);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn watch(&self, query: Query) -> Result<Watch> {
        self.ensure_online()?;

        let (tx, rx) = async_channel::unbounded();
        let collection = query.collection.clone();

        let id = {
            let mut state = self.state.lock();
            let id = state.next_watch_id;
            state.next_watch_id += 1;

            let initial = state.snapshot(&query);
            if tx.try_send(Ok(initial)).is_err() {
                warn!("Watcher {} on {} closed before first snapshot", id, collection);
            }

            state
                .watchers
                .entry(collection.clone())
                .or_default()
                .push(Watcher { id, query, tx });
            id
        };

        debug!("Registered watcher {} on {}", id, collection);

        let state = Arc::downgrade(&self.state);
        let cancel = Unsubscribe::new(move || MemoryStore::release(&state, &collection, id));
        Ok(Watch::new(rx, cancel))
    }

    async fn add(&self, collection: &CollectionPath, data: Value) -> Result<String> {
        self.ensure_online()?;

        let id = Uuid::new_v4().simple().to_string();
        let mut state = self.state.lock();
        state
            .collections
            .entry(collection.clone())
            .or_default()
            .push(Document {
                id: id.clone(),
                data,
            });
        state.notify(collection);

        debug!("Added document {} to {}", id, collection);
        Ok(id)
    }

    async fn set(&self, collection: &CollectionPath, id: &str, data: Value) -> Result<()> {
        self.ensure_online()?;

        let mut state = self.state.lock();
        let docs = state.collections.entry(collection.clone()).or_default();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.data = data,
            None => docs.push(Document {
                id: id.to_string(),
                data,
            }),
        }
        state.notify(collection);

        debug!("Set document {} in {}", id, collection);
        Ok(())
    }

    async fn get(&self, collection: &CollectionPath, id: &str) -> Result<Option<Document>> {
        self.ensure_online()?;

        let state = self.state.lock();
        Ok(state
            .collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }
}

//! Roster stream: every registered user except the signed-in one.

use crate::core::types::timestamp;
use crate::core::{
    CollectionPath, Document, DocumentStore, Query, Result, SyncError, Unsubscribe, UserId,
    UserProfile,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stored shape of `users/{id}`. The id is the document id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDoc {
    #[serde(default)]
    name: Option<String>,
    email: String,
    #[serde(default, with = "timestamp::option")]
    created_at: Option<DateTime<Utc>>,
}

/// Profiles of `docs` in store order, without `me`.
pub fn decode_roster(me: &UserId, docs: Vec<Document>) -> Vec<UserProfile> {
    docs.into_iter()
        .filter(|doc| doc.id != me.as_str())
        .filter_map(|doc| match serde_json::from_value::<ProfileDoc>(doc.data) {
            Ok(profile) => Some(UserProfile {
                id: UserId::new(doc.id),
                name: profile.name,
                email: profile.email,
                created_at: profile.created_at,
            }),
            Err(e) => {
                warn!(doc = %doc.id, error = %e, "Skipping undecodable profile");
                None
            }
        })
        .collect()
}

struct ActiveRoster {
    id: u64,
    receiver: async_channel::Receiver<Result<Vec<Document>>>,
    cancel: Unsubscribe,
}

impl ActiveRoster {
    /// Cancel the watch and discard anything already queued.
    fn release(self) {
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
        self.cancel.unsubscribe();
    }
}

type Slot = Arc<Mutex<Option<ActiveRoster>>>;

/// Source of roster subscriptions. Keeps at most one active: subscribing
/// again releases the previous subscription.
#[derive(Clone)]
pub struct RosterStream {
    store: Arc<dyn DocumentStore>,
    slot: Slot,
    next_id: Arc<AtomicU64>,
}

impl RosterStream {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            slot: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn subscribe(&self, me: &UserId) -> Result<Roster> {
        let watch = self
            .store
            .watch(Query::collection(CollectionPath::users()))
            .await
            .map_err(|e| SyncError::RemoteSubscribe(e.to_string()))?;

        let (receiver, cancel) = watch.into_parts();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let active = ActiveRoster {
            id,
            receiver: receiver.clone(),
            cancel,
        };

        let previous = self.slot.lock().replace(active);
        if let Some(previous) = previous {
            debug!("Releasing previous roster subscription");
            previous.release();
        }

        info!(user = %me, "Subscribed to roster");
        Ok(Roster {
            me: me.clone(),
            id,
            receiver,
            slot: self.slot.clone(),
        })
    }

    /// Release the active subscription, if any.
    pub fn close(&self) {
        let active = self.slot.lock().take();
        if let Some(active) = active {
            info!("Roster closed");
            active.release();
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Live roster subscription.
///
/// Yields the other users on every change to the user collection. Ends when
/// released, either directly or by a newer subscription.
pub struct Roster {
    me: UserId,
    id: u64,
    receiver: async_channel::Receiver<Result<Vec<Document>>>,
    slot: Slot,
}

impl Roster {
    /// Next list of other users, or `None` once this subscription has been
    /// released.
    pub async fn next(&mut self) -> Option<Result<Vec<UserProfile>>> {
        if !self.is_current() {
            return None;
        }
        let item = self.receiver.recv().await.ok()?;
        if !self.is_current() {
            return None;
        }
        Some(match item {
            Ok(docs) => {
                let profiles = decode_roster(&self.me, docs);
                debug!(count = profiles.len(), "Roster snapshot");
                Ok(profiles)
            }
            Err(e) => Err(SyncError::RemoteSubscribe(e.to_string())),
        })
    }

    /// Release the subscription. Dropping the handle does the same.
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn is_current(&self) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|active| active.id == self.id)
    }
}

impl Drop for Roster {
    fn drop(&mut self) {
        let active = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(active) if active.id == self.id => slot.take(),
                _ => None,
            }
        };
        if let Some(active) = active {
            debug!("Roster unsubscribed");
            active.release();
        }
    }
}

//! Synchronization core.
//!
//! Merges the local cache and the remote channel for every open
//! conversation and keeps at most one live subscription per conversation id.

mod conversation;
pub mod state;

pub use conversation::Conversation;
pub use state::{ConversationView, SyncPhase};

use crate::cache::LocalCache;
use crate::channel::ConversationChannel;
use crate::core::{AuthService, ConversationId, Result, UserId};
use crate::identity;
use conversation::{Outbox, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::info;

struct SyncInner {
    outbox: Outbox,
    cache: LocalCache,
    open: Mutex<HashMap<ConversationId, Weak<Shared>>>,
}

/// Registry of open conversations for one client.
#[derive(Clone)]
pub struct SyncCore {
    inner: Arc<SyncInner>,
}

impl SyncCore {
    /// `idempotent_sends` selects keyed writes, which make a retried send
    /// replace its first attempt instead of duplicating it.
    pub fn new(
        auth: Arc<dyn AuthService>,
        channel: ConversationChannel,
        cache: LocalCache,
        idempotent_sends: bool,
    ) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                outbox: Outbox {
                    channel,
                    auth,
                    idempotent: idempotent_sends,
                },
                cache,
                open: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Open the conversation between `me` and `peer`.
    ///
    /// If it is already open the previous handle is closed, and its
    /// subscription released, before the new one subscribes.
    pub async fn open(&self, me: &UserId, peer: &UserId) -> Result<Conversation> {
        let id = identity::resolve(me, peer)?;

        let previous = self.inner.open.lock().remove(&id).and_then(|w| w.upgrade());
        if let Some(previous) = previous {
            info!(conversation = %id, "Conversation already open, closing previous handle");
            previous.shutdown().await;
        }

        let shared = Shared::new(id.clone());
        let raced = {
            let mut open = self.inner.open.lock();
            open.retain(|_, entry| entry.strong_count() > 0);
            open.insert(id.clone(), Arc::downgrade(&shared))
                .and_then(|w| w.upgrade())
        };
        if let Some(raced) = raced {
            raced.request_close();
        }

        shared.start(self.inner.outbox.channel.clone(), self.inner.cache.clone());
        info!(conversation = %id, peer = %peer, "Opened conversation");

        Ok(Conversation::new(
            shared,
            self.inner.outbox.clone(),
            peer.clone(),
        ))
    }

    /// Ids of the conversations that are currently open.
    pub fn open_conversations(&self) -> Vec<ConversationId> {
        let open = self.inner.open.lock();
        let mut ids: Vec<ConversationId> = open
            .iter()
            .filter_map(|(id, entry)| entry.upgrade().map(|shared| (id, shared)))
            .filter(|(_, shared)| shared.phase() != SyncPhase::Closed)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Close every open conversation and wait for their subscriptions to be
    /// released.
    pub async fn close_all(&self) {
        let open: Vec<Arc<Shared>> = self
            .inner
            .open
            .lock()
            .drain()
            .filter_map(|(_, entry)| entry.upgrade())
            .collect();

        if !open.is_empty() {
            info!(count = open.len(), "Closing all conversations");
        }
        for shared in open {
            shared.shutdown().await;
        }
    }
}

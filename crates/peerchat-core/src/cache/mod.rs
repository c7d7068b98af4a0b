//! Local cache adapter: one serialized message log per conversation key.
//!
//! Reads never fail from the caller's point of view. A missing, unreadable
//! or corrupt entry is "no local data yet".

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileCache;
pub use memory::MemoryCache;

use crate::core::{ConversationId, KeyValueCache, Message, MessageLog, Result, SyncError};
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed view over a [`KeyValueCache`] keyed by conversation id.
#[derive(Clone)]
pub struct LocalCache {
    backend: Arc<dyn KeyValueCache>,
}

impl LocalCache {
    pub fn new(backend: Arc<dyn KeyValueCache>) -> Self {
        Self { backend }
    }

    /// Cached log for `conversation`, empty if there is none usable.
    pub async fn load(&self, conversation: &ConversationId) -> MessageLog {
        let raw = match self.backend.get(conversation.as_str()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(conversation = %conversation, "No cached messages");
                return MessageLog::new();
            }
            Err(e) => {
                warn!(conversation = %conversation, error = %e, "Cache read failed, starting empty");
                return MessageLog::new();
            }
        };

        match serde_json::from_str::<Vec<Message>>(&raw) {
            Ok(messages) => {
                debug!(conversation = %conversation, count = messages.len(), "Loaded cached messages");
                MessageLog::from_unordered(messages)
            }
            Err(e) => {
                warn!(conversation = %conversation, error = %e, "Cached messages are corrupt, starting empty");
                MessageLog::new()
            }
        }
    }

    /// Replace the cached log for `conversation`.
    pub async fn store(&self, conversation: &ConversationId, log: &MessageLog) -> Result<()> {
        let raw =
            serde_json::to_string(log).map_err(|e| SyncError::CacheWrite(e.to_string()))?;

        self.backend
            .set(conversation.as_str(), raw)
            .await
            .map_err(|e| match e {
                SyncError::CacheWrite(_) => e,
                other => SyncError::CacheWrite(other.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UserId;
    use crate::identity::resolve;
    use chrono::{TimeZone, Utc};

    fn conversation() -> ConversationId {
        resolve(&UserId::new("u1"), &UserId::new("u2")).unwrap()
    }

    fn log(texts: &[&str]) -> MessageLog {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                Message::at(
                    *t,
                    UserId::new("u1"),
                    Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
                )
            })
            .collect::<Vec<_>>()
            .into()
    }

    #[tokio::test]
    async fn test_missing_key_loads_empty() {
        let cache = LocalCache::new(Arc::new(MemoryCache::new()));
        assert!(cache.load(&conversation()).await.is_empty());
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let cache = LocalCache::new(Arc::new(MemoryCache::new()));
        let expected = log(&["hi", "there"]);

        cache.store(&conversation(), &expected).await.unwrap();
        assert_eq!(cache.load(&conversation()).await, expected);
    }

    #[tokio::test]
    async fn test_store_fully_replaces() {
        let cache = LocalCache::new(Arc::new(MemoryCache::new()));

        cache.store(&conversation(), &log(&["a", "b", "c"])).await.unwrap();
        cache.store(&conversation(), &log(&["z"])).await.unwrap();

        assert_eq!(cache.load(&conversation()).await.texts(), vec!["z"]);
    }

    #[tokio::test]
    async fn test_corrupt_entry_loads_empty() {
        let backend = Arc::new(MemoryCache::new());
        backend
            .set(conversation().as_str(), "{ malformed json ...".into())
            .await
            .unwrap();

        let cache = LocalCache::new(backend);
        assert!(cache.load(&conversation()).await.is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_loads_empty() {
        let backend = Arc::new(MemoryCache::new());
        let cache = LocalCache::new(backend.clone());
        cache.store(&conversation(), &log(&["kept"])).await.unwrap();

        backend.set_fail_reads(true);
        assert!(cache.load(&conversation()).await.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_cache_write() {
        let backend = Arc::new(MemoryCache::new());
        backend.set_fail_writes(true);

        let cache = LocalCache::new(backend);
        let err = cache.store(&conversation(), &log(&["x"])).await.unwrap_err();
        assert!(matches!(err, SyncError::CacheWrite(_)));
    }
}

//! Remote conversation channel.
//!
//! Wraps the document store for one message collection per conversation
//! (`conversations/{id}/messages`): an ordered realtime subscription that
//! yields the full log on every change, and the append operation.
//!
//! Appending never touches a local log. The sender sees its own message only
//! when the next snapshot carries it back.

use crate::core::{
    CollectionPath, ConversationId, Direction, Document, DocumentStore, Message, MessageLog,
    PendingSend, Query, Result, SyncError, Watch,
};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};

/// Field the message collection is ordered by.
pub const ORDER_FIELD: &str = "createdAt";

/// Decode a raw snapshot into an ordered log, skipping foreign documents.
pub fn decode_log(conversation: &ConversationId, docs: Vec<Document>) -> MessageLog {
    let messages = docs
        .into_iter()
        .filter_map(|doc| match serde_json::from_value::<Message>(doc.data) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(conversation = %conversation, doc = %doc.id, error = %e, "Skipping undecodable message");
                None
            }
        })
        .collect();
    MessageLog::from_unordered(messages)
}

/// Live subscription to one conversation's messages.
///
/// Dropping it has the same effect as [`MessageSubscription::unsubscribe`].
#[derive(Debug)]
pub struct MessageSubscription {
    conversation: ConversationId,
    watch: Watch,
}

impl MessageSubscription {
    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Next full snapshot of the conversation, or `None` if the remote side
    /// ended the subscription.
    pub async fn next(&mut self) -> Option<Result<MessageLog>> {
        let item = self.watch.next().await?;
        Some(self.decode(item))
    }

    pub fn unsubscribe(self) {
        debug!(conversation = %self.conversation, "Unsubscribing from messages");
        self.watch.unsubscribe();
    }

    fn decode(&self, item: Result<Vec<Document>>) -> Result<MessageLog> {
        match item {
            Ok(docs) => Ok(decode_log(&self.conversation, docs)),
            Err(e) => Err(SyncError::RemoteSubscribe(e.to_string())),
        }
    }
}

impl Stream for MessageSubscription {
    type Item = Result<MessageLog>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.watch).poll_next(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(self.decode(item))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Message collection access for every conversation of a client.
#[derive(Clone)]
pub struct ConversationChannel {
    store: Arc<dyn DocumentStore>,
}

impl ConversationChannel {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Open an ascending-by-`createdAt` realtime subscription.
    pub async fn subscribe(&self, conversation: &ConversationId) -> Result<MessageSubscription> {
        let query = Query::collection(CollectionPath::messages(conversation))
            .order_by(ORDER_FIELD, Direction::Ascending);

        let watch = self
            .store
            .watch(query)
            .await
            .map_err(|e| SyncError::RemoteSubscribe(e.to_string()))?;

        info!(conversation = %conversation, "Subscribed to messages");
        Ok(MessageSubscription {
            conversation: conversation.clone(),
            watch,
        })
    }

    /// Append `message` under a store-assigned id.
    ///
    /// Not idempotent: calling it again with the same message stores a
    /// second copy.
    pub async fn append(&self, conversation: &ConversationId, message: &Message) -> Result<()> {
        let data = serde_json::to_value(message)?;
        let id = self
            .store
            .add(&CollectionPath::messages(conversation), data)
            .await
            .map_err(|e| SyncError::RemoteWrite {
                reason: e.to_string(),
                pending: None,
            })?;

        debug!(conversation = %conversation, doc = %id, "Appended message");
        Ok(())
    }

    /// Write `pending` under its own key. Repeating the call with the same
    /// pending message replaces the document instead of duplicating it.
    pub async fn append_keyed(
        &self,
        conversation: &ConversationId,
        pending: &PendingSend,
    ) -> Result<()> {
        let data = serde_json::to_value(&pending.message)?;
        let key = pending.key.simple().to_string();
        self.store
            .set(&CollectionPath::messages(conversation), &key, data)
            .await
            .map_err(|e| SyncError::RemoteWrite {
                reason: e.to_string(),
                pending: None,
            })?;

        debug!(conversation = %conversation, doc = %key, "Wrote keyed message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UserId;
    use crate::identity::resolve;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn setup() -> (Arc<MemoryStore>, ConversationChannel, ConversationId) {
        let store = Arc::new(MemoryStore::new());
        let channel = ConversationChannel::new(store.clone());
        let conversation = resolve(&UserId::new("u1"), &UserId::new("u2")).unwrap();
        (store, channel, conversation)
    }

    fn msg(text: &str, secs: i64) -> Message {
        Message::at(text, UserId::new("u1"), Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[tokio::test]
    async fn test_first_snapshot_is_current_state() {
        let (_store, channel, conversation) = setup();
        channel.append(&conversation, &msg("before", 1)).await.unwrap();

        let mut sub = channel.subscribe(&conversation).await.unwrap();
        let log = sub.next().await.unwrap().unwrap();
        assert_eq!(log.texts(), vec!["before"]);
    }

    #[tokio::test]
    async fn test_append_is_seen_only_through_subscription() {
        let (_store, channel, conversation) = setup();
        let mut sub = channel.subscribe(&conversation).await.unwrap();
        assert!(sub.next().await.unwrap().unwrap().is_empty());

        channel.append(&conversation, &msg("hi", 1)).await.unwrap();
        let log = sub.next().await.unwrap().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sender_id, UserId::new("u1"));
    }

    #[tokio::test]
    async fn test_snapshot_sorted_regardless_of_insertion() {
        let (_store, channel, conversation) = setup();
        for (text, secs) in [("t3", 3), ("t1", 1), ("t2", 2)] {
            channel.append(&conversation, &msg(text, secs)).await.unwrap();
        }

        let mut sub = channel.subscribe(&conversation).await.unwrap();
        assert_eq!(sub.next().await.unwrap().unwrap().texts(), vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_subscription_as_stream() {
        use futures::StreamExt;

        let (_store, channel, conversation) = setup();
        let sub = channel.subscribe(&conversation).await.unwrap();
        channel.append(&conversation, &msg("streamed", 1)).await.unwrap();

        let logs: Vec<_> = sub.take(2).collect().await;
        assert!(logs[0].as_ref().unwrap().is_empty());
        assert_eq!(logs[1].as_ref().unwrap().texts(), vec!["streamed"]);
    }

    #[tokio::test]
    async fn test_plain_append_duplicates_on_retry() {
        let (store, channel, conversation) = setup();
        let message = msg("again", 1);

        channel.append(&conversation, &message).await.unwrap();
        channel.append(&conversation, &message).await.unwrap();
        assert_eq!(store.document_count(&CollectionPath::messages(&conversation)), 2);
    }

    #[tokio::test]
    async fn test_keyed_append_does_not_duplicate() {
        let (store, channel, conversation) = setup();
        let pending = PendingSend::new(msg("once", 1));

        channel.append_keyed(&conversation, &pending).await.unwrap();
        channel.append_keyed(&conversation, &pending).await.unwrap();
        assert_eq!(store.document_count(&CollectionPath::messages(&conversation)), 1);
    }

    #[tokio::test]
    async fn test_failures_are_classified() {
        let (store, channel, conversation) = setup();
        store.set_offline(true);

        assert!(matches!(
            channel.subscribe(&conversation).await,
            Err(SyncError::RemoteSubscribe(_))
        ));
        assert!(matches!(
            channel.append(&conversation, &msg("x", 1)).await,
            Err(SyncError::RemoteWrite { .. })
        ));
    }

    #[tokio::test]
    async fn test_foreign_documents_are_skipped() {
        let (store, channel, conversation) = setup();
        store
            .add(&CollectionPath::messages(&conversation), json!({"unexpected": true}))
            .await
            .unwrap();
        channel.append(&conversation, &msg("real", 1)).await.unwrap();

        let mut sub = channel.subscribe(&conversation).await.unwrap();
        assert_eq!(sub.next().await.unwrap().unwrap().texts(), vec!["real"]);
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_store_watcher() {
        let (store, channel, conversation) = setup();
        let sub = channel.subscribe(&conversation).await.unwrap();
        assert_eq!(store.watcher_count(&CollectionPath::messages(&conversation)), 1);

        sub.unsubscribe();
        assert_eq!(store.watcher_count(&CollectionPath::messages(&conversation)), 0);
    }
}

//! Subscription handles shared by the store, the conversation channel and
//! the roster stream.

use crate::core::error::Result;
use crate::core::types::Document;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Capability that cancels a realtime subscription.
///
/// The release closure runs exactly once: on [`Unsubscribe::unsubscribe`]
/// or, failing that, when the handle is dropped.
pub struct Unsubscribe {
    release: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Unsubscribe {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    pub fn unsubscribe(mut self) {
        self.fire();
    }

    fn fire(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.fire();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Raw realtime result of a [`crate::DocumentStore::watch`] query.
///
/// Every item is the complete ordered collection, never a delta.
///
/// The receiver is boxed and pinned because it parks a listener in place
/// while polled.
#[derive(Debug)]
pub struct Watch {
    receiver: Pin<Box<async_channel::Receiver<Result<Vec<Document>>>>>,
    cancel: Unsubscribe,
}

impl Watch {
    pub fn new(
        receiver: async_channel::Receiver<Result<Vec<Document>>>,
        cancel: Unsubscribe,
    ) -> Self {
        Self {
            receiver: Box::pin(receiver),
            cancel,
        }
    }

    /// Next snapshot, or `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Result<Vec<Document>>> {
        self.receiver.recv().await.ok()
    }

    /// Stop the watch. Consumes the handle so no snapshot can follow.
    pub fn unsubscribe(self) {
        self.receiver.close();
        self.cancel.unsubscribe();
    }

    /// Split into the snapshot receiver and the release capability, for
    /// owners that cancel from somewhere other than the reading side.
    pub fn into_parts(self) -> (async_channel::Receiver<Result<Vec<Document>>>, Unsubscribe) {
        let receiver = async_channel::Receiver::clone(&self.receiver);
        (receiver, self.cancel)
    }
}

impl Stream for Watch {
    type Item = Result<Vec<Document>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_unsubscribe_fires_once_explicitly() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = Unsubscribe::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.is_active());
        handle.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_fires_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let c = count.clone();
            let _handle = Unsubscribe::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_watch_yields_until_sender_closes() {
        let (tx, rx) = async_channel::unbounded();
        let mut watch = Watch::new(rx, Unsubscribe::noop());

        tx.send(Ok(vec![])).await.unwrap();
        drop(tx);

        assert!(matches!(watch.next().await, Some(Ok(docs)) if docs.is_empty()));
        assert!(watch.next().await.is_none());
    }

    #[tokio::test]
    async fn test_watch_as_stream() {
        use futures::StreamExt;

        let (tx, rx) = async_channel::unbounded();
        let watch = Watch::new(rx, Unsubscribe::noop());
        tx.send(Ok(vec![])).await.unwrap();
        tx.send(Ok(vec![])).await.unwrap();
        drop(tx);

        let items: Vec<_> = watch.collect().await;
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_watch_pending_until_snapshot() {
        let (tx, rx) = async_channel::unbounded();
        let mut watch = Watch::new(rx, Unsubscribe::noop());

        let mut next = tokio_test::task::spawn(watch.next());
        tokio_test::assert_pending!(next.poll());

        tx.try_send(Ok(vec![])).unwrap();
        let item = tokio_test::assert_ready!(next.poll());
        assert!(matches!(item, Some(Ok(docs)) if docs.is_empty()));
    }

    #[test]
    fn test_into_parts_keeps_release() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let (_tx, rx) = async_channel::unbounded();
        let watch = Watch::new(
            rx,
            Unsubscribe::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let (receiver, cancel) = watch.into_parts();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!receiver.is_closed());
        receiver.close();
        cancel.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

//! One open conversation: the driver task and the handle given to callers.
//!
//! The driver joins two branches. Hydration loads the cached log and
//! installs it if no snapshot beat it. The live branch subscribes, then for
//! every snapshot overwrites the log, writes it through to the cache and
//! publishes the new view. A close request is sticky: if it arrives while
//! the subscribe call is still pending, the subscription is released as soon
//! as it exists.

use super::state::{ConversationState, ConversationView, SyncPhase};
use crate::cache::LocalCache;
use crate::channel::ConversationChannel;
use crate::core::{
    AuthService, ConversationId, Message, MessageLog, PendingSend, Result, SyncError, UserId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// State shared between a [`Conversation`] handle, its driver task and the
/// registry.
pub(crate) struct Shared {
    id: ConversationId,
    state: Mutex<ConversationState>,
    view: watch::Sender<ConversationView>,
    close: watch::Sender<bool>,
    /// Set once the driver has returned and its subscription is gone.
    finished: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    pub fn new(id: ConversationId) -> Arc<Self> {
        let (view, _) = watch::channel(ConversationView::default());
        let (close, _) = watch::channel(false);
        let (finished, _) = watch::channel(false);
        Arc::new(Self {
            id,
            state: Mutex::new(ConversationState::new()),
            view,
            close,
            finished,
            task: Mutex::new(None),
        })
    }

    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.lock().phase()
    }

    /// Enter `Hydrating` and spawn the driver.
    pub fn start(self: &Arc<Self>, channel: ConversationChannel, cache: LocalCache) {
        if self.apply(ConversationState::begin) {
            self.publish();
        }
        let task = tokio::spawn(drive(self.clone(), channel, cache));
        *self.task.lock() = Some(task);
    }

    fn apply(&self, f: impl FnOnce(&mut ConversationState) -> bool) -> bool {
        let mut state = self.state.lock();
        f(&mut *state)
    }

    fn publish(&self) {
        let state = self.state.lock();
        self.view.send_replace(state.view());
    }

    /// Mark closed and signal the driver. Never waits.
    pub fn request_close(&self) {
        if self.apply(ConversationState::close) {
            info!(conversation = %self.id, "Closing conversation");
            self.publish();
        }
        self.close.send_replace(true);
    }

    /// Close and wait for the driver to release its subscription.
    ///
    /// Safe to call from several places at once: every caller waits for the
    /// same release, not only the one that joins the task.
    pub async fn shutdown(&self) {
        self.request_close();
        let mut finished = self.finished.subscribe();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(conversation = %self.id, error = %e, "Conversation driver failed");
            }
            // a panicked driver never got to say so itself
            self.finished.send_replace(true);
        }

        let _ = finished.wait_for(|done| *done).await;
    }
}

async fn drive(shared: Arc<Shared>, channel: ConversationChannel, cache: LocalCache) {
    let mut close_rx = shared.close.subscribe();
    tokio::join!(
        hydrate(&shared, &cache),
        follow(&shared, &channel, &cache, &mut close_rx)
    );
    shared.finished.send_replace(true);
    debug!(conversation = %shared.id, "Conversation driver finished");
}

async fn hydrate(shared: &Shared, cache: &LocalCache) {
    let log = cache.load(&shared.id).await;
    let count = log.len();
    if shared.apply(|state| state.apply_hydration(log)) {
        debug!(conversation = %shared.id, count, "Hydrated from cache");
        shared.publish();
    } else {
        debug!(conversation = %shared.id, "Cached log superseded");
    }
}

async fn close_requested(close_rx: &mut watch::Receiver<bool>) {
    let _ = close_rx.wait_for(|closed| *closed).await;
}

async fn follow(
    shared: &Shared,
    channel: &ConversationChannel,
    cache: &LocalCache,
    close_rx: &mut watch::Receiver<bool>,
) {
    let id = &shared.id;

    // Not raced against close: the subscription has to exist before it can
    // be released.
    let mut subscription = match channel.subscribe(id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(conversation = %id, error = %e, "Subscribe failed, keeping cached messages");
            if shared.apply(|state| state.fail_subscribe(e.to_string())) {
                shared.publish();
            }
            return;
        }
    };

    if *close_rx.borrow() {
        debug!(conversation = %id, "Closed while subscribing");
        subscription.unsubscribe();
        return;
    }

    loop {
        let next = tokio::select! {
            biased;
            _ = close_requested(close_rx) => break,
            next = subscription.next() => next,
        };

        match next {
            Some(Ok(log)) => {
                let count = log.len();
                if !shared.apply(|state| state.apply_snapshot(log.clone())) {
                    break;
                }
                debug!(conversation = %id, count, "Applied snapshot");

                if let Err(e) = cache.store(id, &log).await {
                    warn!(conversation = %id, error = %e, "Write-through failed");
                }
                shared.publish();
            }
            Some(Err(e)) => {
                warn!(conversation = %id, error = %e, "Subscription reported an error");
                if shared.apply(|state| state.fail_subscribe(e.to_string())) {
                    shared.publish();
                }
            }
            None => {
                info!(conversation = %id, "Remote ended the subscription");
                break;
            }
        }
    }

    subscription.unsubscribe();
}

/// Everything the send path needs, shared by every conversation of a client.
#[derive(Clone)]
pub(crate) struct Outbox {
    pub channel: ConversationChannel,
    pub auth: Arc<dyn AuthService>,
    pub idempotent: bool,
}

impl Outbox {
    async fn deliver(&self, id: &ConversationId, pending: PendingSend) -> Result<Message> {
        let result = if self.idempotent {
            self.channel.append_keyed(id, &pending).await
        } else {
            self.channel.append(id, &pending.message).await
        };

        match result {
            Ok(()) => {
                debug!(conversation = %id, key = %pending.key, "Message accepted");
                Ok(pending.message)
            }
            Err(SyncError::RemoteWrite { reason, .. }) => {
                warn!(conversation = %id, key = %pending.key, reason = %reason, "Message not delivered");
                Err(SyncError::remote_write(reason, pending))
            }
            Err(e) => Err(e),
        }
    }
}

/// Handle to an open conversation.
///
/// Dropping the handle closes the conversation; [`Conversation::close`]
/// additionally waits until the subscription has been released.
pub struct Conversation {
    shared: Arc<Shared>,
    outbox: Outbox,
    peer: UserId,
    view_rx: watch::Receiver<ConversationView>,
}

impl Conversation {
    pub(crate) fn new(shared: Arc<Shared>, outbox: Outbox, peer: UserId) -> Self {
        let view_rx = shared.view.subscribe();
        Self {
            shared,
            outbox,
            peer,
            view_rx,
        }
    }

    pub fn id(&self) -> &ConversationId {
        self.shared.id()
    }

    pub fn peer(&self) -> &UserId {
        &self.peer
    }

    pub fn phase(&self) -> SyncPhase {
        self.shared.phase()
    }

    /// Latest published view.
    pub fn view(&self) -> ConversationView {
        self.view_rx.borrow().clone()
    }

    pub fn messages(&self) -> MessageLog {
        self.view_rx.borrow().messages.clone()
    }

    /// Independent receiver for observers such as a UI.
    pub fn subscribe_view(&self) -> watch::Receiver<ConversationView> {
        self.shared.view.subscribe()
    }

    /// Wait for the next published view.
    pub async fn changed(&mut self) -> Result<ConversationView> {
        self.view_rx
            .changed()
            .await
            .map_err(|_| SyncError::ConversationClosed)?;
        Ok(self.view_rx.borrow_and_update().clone())
    }

    /// Wait until the published view satisfies `f`, checking the current
    /// one first.
    pub async fn wait_until(
        &mut self,
        mut f: impl FnMut(&ConversationView) -> bool,
    ) -> Result<ConversationView> {
        let view = self
            .view_rx
            .wait_for(|view| f(view))
            .await
            .map_err(|_| SyncError::ConversationClosed)?
            .clone();
        Ok(view)
    }

    /// Wait for the first remote snapshot.
    ///
    /// Fails with `RemoteSubscribe` if the subscription could not be
    /// established, and with `ConversationClosed` if closed first.
    pub async fn wait_live(&mut self) -> Result<()> {
        let view = self
            .wait_until(|view| {
                matches!(view.phase, SyncPhase::Live | SyncPhase::Closed)
                    || view.subscribe_error.is_some()
            })
            .await?;

        match (view.phase, view.subscribe_error) {
            (SyncPhase::Live, _) => Ok(()),
            (SyncPhase::Closed, _) => Err(SyncError::ConversationClosed),
            (_, Some(reason)) => Err(SyncError::RemoteSubscribe(reason)),
            (_, None) => Err(SyncError::ConversationClosed),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.state.lock().accepts_sends() {
            Ok(())
        } else {
            Err(SyncError::ConversationClosed)
        }
    }

    /// Append a message from the signed-in user.
    ///
    /// The local log is not touched: the message shows up with the next
    /// remote snapshot. On failure the returned `RemoteWrite` error carries
    /// the [`PendingSend`] for [`Conversation::retry`].
    pub async fn send(&self, text: &str) -> Result<Message> {
        self.ensure_open()?;
        if text.trim().is_empty() {
            return Err(SyncError::EmptyMessage);
        }
        let user = self
            .outbox
            .auth
            .current_user()
            .ok_or(SyncError::AuthUnavailable)?;

        let pending = PendingSend::new(Message::new(text, user.id));
        self.outbox.deliver(self.id(), pending).await
    }

    /// Resend a message a previous [`Conversation::send`] failed to deliver.
    pub async fn retry(&self, pending: PendingSend) -> Result<Message> {
        self.ensure_open()?;
        self.outbox.deliver(self.id(), pending).await
    }

    /// Close without waiting. Later calls are no-ops.
    pub fn request_close(&self) {
        self.shared.request_close();
    }

    /// Close and wait until the subscription has been released.
    pub async fn close(self) {
        self.shared.shutdown().await;
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.shared.request_close();
    }
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("id", self.id())
            .field("peer", &self.peer)
            .field("phase", &self.phase())
            .finish()
    }
}

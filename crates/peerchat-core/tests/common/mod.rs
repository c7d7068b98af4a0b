#![allow(dead_code)]

use async_trait::async_trait;
use peerchat_core::{
    AuthService, AuthUser, Client, CollectionPath, Document, DocumentStore, KeyValueCache,
    MemoryCache, MemoryStore, Query, Result, SyncConfig, SyncError, UserId, Watch,
};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};

pub fn uid(id: &str) -> UserId {
    UserId::new(id)
}

/// Auth service with a fixed signed-in identity.
pub struct FixedAuth {
    state: watch::Sender<Option<AuthUser>>,
}

impl FixedAuth {
    pub fn signed_in(id: &str) -> Arc<Self> {
        let user = AuthUser {
            id: uid(id),
            email: format!("{id}@example.com"),
        };
        let (state, _) = watch::channel(Some(user));
        Arc::new(Self { state })
    }
}

#[async_trait]
impl AuthService for FixedAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.state.borrow().clone()
    }

    fn subscribe_auth_state(&self) -> watch::Receiver<Option<AuthUser>> {
        self.state.subscribe()
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthUser> {
        Err(SyncError::Auth("fixed identity".into()))
    }

    async fn create_account(&self, _email: &str, _password: &str) -> Result<AuthUser> {
        Err(SyncError::Auth("fixed identity".into()))
    }

    async fn sign_out(&self) -> Result<()> {
        self.state.send_replace(None);
        Ok(())
    }
}

/// Store whose `watch` calls block until the gate is opened.
pub struct GatedStore {
    pub inner: Arc<MemoryStore>,
    gate: watch::Sender<bool>,
    entered: AtomicUsize,
    entered_notify: Notify,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        let (gate, _) = watch::channel(false);
        Arc::new(Self {
            inner,
            gate,
            entered: AtomicUsize::new(0),
            entered_notify: Notify::new(),
        })
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Wait until some `watch` call is parked at the gate.
    pub async fn wait_entered(&self) {
        loop {
            let notified = self.entered_notify.notified();
            if self.entered.load(Ordering::SeqCst) > 0 {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn watch(&self, query: Query) -> Result<Watch> {
        let mut gate = self.gate.subscribe();
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.entered_notify.notify_waiters();
        let _ = gate.wait_for(|open| *open).await;
        self.inner.watch(query).await
    }

    async fn add(&self, collection: &CollectionPath, data: Value) -> Result<String> {
        self.inner.add(collection, data).await
    }

    async fn set(&self, collection: &CollectionPath, id: &str, data: Value) -> Result<()> {
        self.inner.set(collection, id, data).await
    }

    async fn get(&self, collection: &CollectionPath, id: &str) -> Result<Option<Document>> {
        self.inner.get(collection, id).await
    }
}

pub fn config() -> SyncConfig {
    SyncConfig::with_base_dir(std::env::temp_dir().join("peerchat-tests"))
}

/// Client signed in as `id` with an in-memory cache.
pub fn client(
    id: &str,
    store: Arc<dyn DocumentStore>,
    config: SyncConfig,
) -> (Client, Arc<FixedAuth>, Arc<MemoryCache>) {
    let auth = FixedAuth::signed_in(id);
    let cache = Arc::new(MemoryCache::new());
    let client = Client::new(config, auth.clone(), store, cache.clone());
    (client, auth, cache)
}

pub fn client_with_cache(
    id: &str,
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn KeyValueCache>,
) -> Client {
    Client::new(config(), FixedAuth::signed_in(id), store, cache)
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Bound an await so a broken sync path fails instead of hanging.
pub async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out")
}

//! Seams to the three external collaborators.
//!
//! The sync core only ever talks to these traits; concrete handles are
//! injected at construction so tests can swap in fakes.

use crate::core::error::Result;
use crate::core::subscription::Watch;
use crate::core::types::{AuthUser, CollectionPath, Document, Query};
use async_trait::async_trait;
use tokio::sync::watch;

/// Abstraction for the authentication service.
#[async_trait]
pub trait AuthService: Send + Sync + 'static {
    /// The signed-in account, if any.
    fn current_user(&self) -> Option<AuthUser>;

    /// Receiver that observes every sign-in and sign-out.
    fn subscribe_auth_state(&self) -> watch::Receiver<Option<AuthUser>>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser>;
    async fn create_account(&self, email: &str, password: &str) -> Result<AuthUser>;
    async fn sign_out(&self) -> Result<()>;
}

/// Abstraction for the remote, authoritative document store.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Realtime query. The returned watch yields the full ordered result
    /// immediately and again after every mutation of the collection.
    async fn watch(&self, query: Query) -> Result<Watch>;

    /// Append a document under a store-assigned id.
    async fn add(&self, collection: &CollectionPath, data: serde_json::Value) -> Result<String>;

    /// Create or replace the document `id`.
    async fn set(&self, collection: &CollectionPath, id: &str, data: serde_json::Value)
        -> Result<()>;

    async fn get(&self, collection: &CollectionPath, id: &str) -> Result<Option<Document>>;
}

/// Abstraction for the local persistent key-value cache.
#[async_trait]
pub trait KeyValueCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Atomically replace the value stored under `key`.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;
}

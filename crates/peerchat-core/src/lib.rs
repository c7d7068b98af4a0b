//! peerchat-core: conversation synchronization for a two-party chat client.
//!
//! The crate is organised leaf-first:
//!
//! - **identity**: deterministic, symmetric conversation ids.
//! - **cache**: per-conversation message log persisted locally.
//! - **channel**: realtime subscription and append on a conversation's remote
//!   message collection.
//! - **sync**: the merge between cache and channel for every open
//!   conversation, and the send path.
//! - **roster**: realtime list of the other users.
//! - **account**: sign-in-or-register and profile bootstrap.
//! - **client**: the facade holding the injected collaborators.
//!
//! The authentication service, remote document store and local cache are
//! traits in [`core::traits`]; [`auth`], [`store`] and [`cache`] carry
//! in-process and file-backed implementations.

pub mod account;
pub mod auth;
pub mod cache;
pub mod channel;
pub mod client;
pub mod config;
pub mod core;
pub mod identity;
pub mod roster;
pub mod store;
pub mod sync;

// Top-level re-exports for common usage
pub use crate::account::AccountFlow;
pub use crate::auth::MemoryAuth;
pub use crate::cache::{JsonFileCache, LocalCache, MemoryCache};
pub use crate::channel::{ConversationChannel, MessageSubscription};
pub use crate::client::Client;
pub use crate::config::SyncConfig;
pub use crate::core::error::{Result, SyncError};
pub use crate::core::{
    AuthService, AuthUser, CollectionPath, ConversationId, Credentials, Document, DocumentStore,
    KeyValueCache, Message, MessageLog, PendingSend, Query, Unsubscribe, UserId, UserProfile,
    Watch,
};
pub use crate::identity::resolve;
pub use crate::roster::{Roster, RosterStream};
pub use crate::store::MemoryStore;
pub use crate::sync::{Conversation, ConversationView, SyncCore, SyncPhase};

//! Error types for peerchat synchronization.

use crate::core::types::PendingSend;
use std::io;
use thiserror::Error;

/// Result type for peerchat operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while syncing conversations.
///
/// None of these are fatal to the process: every failure path degrades to
/// "show the last known state".
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    #[error("No signed-in user")]
    AuthUnavailable,

    #[error("Invalid email or password")]
    InvalidCredential,

    #[error("Email already registered")]
    EmailInUse,

    #[error("Password must be at least 6 characters")]
    WeakPassword,

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cannot open a conversation with yourself")]
    SelfConversation,

    #[error("Invalid user identity: {0}")]
    InvalidIdentity(String),

    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Conversation is closed")]
    ConversationClosed,

    #[error("Cache read failed: {0}")]
    CacheRead(String),

    #[error("Cache write failed: {0}")]
    CacheWrite(String),

    #[error("Remote subscribe failed: {0}")]
    RemoteSubscribe(String),

    #[error("Remote write failed: {reason}")]
    RemoteWrite {
        reason: String,
        /// The message that was not delivered, ready to be retried.
        pending: Option<Box<PendingSend>>,
    },

    #[error("Store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Build a `RemoteWrite` that carries the undelivered message.
    pub fn remote_write(reason: impl Into<String>, pending: PendingSend) -> Self {
        SyncError::RemoteWrite {
            reason: reason.into(),
            pending: Some(Box::new(pending)),
        }
    }

    /// Check if the caller may reasonably retry the same operation.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteWrite { .. }
                | SyncError::RemoteSubscribe(_)
                | SyncError::Store(_)
                | SyncError::Io(_)
        )
    }

    /// Check if this error means the user has to (re)authenticate.
    #[inline]
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            SyncError::AuthUnavailable
                | SyncError::InvalidCredential
                | SyncError::EmailInUse
                | SyncError::WeakPassword
                | SyncError::Auth(_)
        )
    }

    /// Take the undelivered message out of a `RemoteWrite` error.
    pub fn into_pending(self) -> Option<PendingSend> {
        match self {
            SyncError::RemoteWrite { pending, .. } => pending.map(|p| *p),
            _ => None,
        }
    }
}

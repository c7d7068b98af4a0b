//! Data model, error taxonomy and collaborator seams.

pub mod error;
pub mod subscription;
pub mod traits;
pub mod types;

pub use error::{Result, SyncError};
pub use subscription::{Unsubscribe, Watch};
pub use traits::{AuthService, DocumentStore, KeyValueCache};
pub use types::{
    AuthUser, CollectionPath, ConversationId, Credentials, Direction, Document, Message,
    MessageLog, PendingSend, Query, UserId, UserProfile,
};

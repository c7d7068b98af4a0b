//! Deterministic conversation identity.
//!
//! `resolve(a, b)` orders the two participants lexicographically and joins
//! them with [`CONVERSATION_SEPARATOR`]. Because identifiers may not contain
//! the separator, the mapping is symmetric and injective over unordered pairs.

use crate::core::types::{ConversationId, UserId, CONVERSATION_SEPARATOR};
use crate::core::{Result, SyncError};

/// Check that `id` can take part in a conversation id.
pub fn validate(id: &UserId) -> Result<()> {
    if id.as_str().is_empty() {
        return Err(SyncError::InvalidIdentity("identifier is empty".into()));
    }
    if id.as_str().contains(CONVERSATION_SEPARATOR) {
        return Err(SyncError::InvalidIdentity(format!(
            "identifier {:?} contains the separator {:?}",
            id.as_str(),
            CONVERSATION_SEPARATOR
        )));
    }
    Ok(())
}

/// Canonical id of the conversation between `a` and `b`.
pub fn resolve(a: &UserId, b: &UserId) -> Result<ConversationId> {
    validate(a)?;
    validate(b)?;

    if a == b {
        return Err(SyncError::SelfConversation);
    }

    let (low, high) = if a < b { (a, b) } else { (b, a) };
    Ok(ConversationId::from_ordered(low, high))
}

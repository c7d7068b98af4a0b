//! Data model shared by every peerchat component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use uuid::Uuid;

/// Separator between the two participants of a conversation id.
pub const CONVERSATION_SEPARATOR: char = '_';

/// Opaque user identifier issued by the authentication service.
///
/// Only ever compared and ordered, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Canonical identifier of a two-party conversation.
///
/// Built by [`crate::identity::resolve`]; never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub(crate) fn from_ordered(low: &UserId, high: &UserId) -> Self {
        Self(format!("{}{}{}", low, CONVERSATION_SEPARATOR, high))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the id back into its two participants, smaller first.
    pub fn participants(&self) -> Option<(UserId, UserId)> {
        let (low, high) = self.0.split_once(CONVERSATION_SEPARATOR)?;
        if low.is_empty() || high.is_empty() || high.contains(CONVERSATION_SEPARATOR) {
            return None;
        }
        Some((UserId::new(low), UserId::new(high)))
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed-width RFC 3339 timestamps (`2024-01-01T00:00:00.000Z`).
///
/// The width is fixed so that the textual form sorts like the instant it
/// encodes, which the store relies on when ordering by `createdAt`.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match at {
                Some(at) => serializer.serialize_some(&super::format(at)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            Ok(raw.as_deref().and_then(super::parse))
        }
    }
}

/// A single chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub text: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub sender_id: UserId,
}

impl Message {
    /// New message stamped with the current time.
    pub fn new(text: impl Into<String>, sender_id: UserId) -> Self {
        Self::at(text, sender_id, Utc::now())
    }

    pub fn at(text: impl Into<String>, sender_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            created_at,
            sender_id,
        }
    }

    pub fn is_from(&self, user: &UserId) -> bool {
        &self.sender_id == user
    }
}

/// Messages of one conversation, ascending by `created_at`.
///
/// Equal timestamps keep the order they were delivered in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageLog(Vec<Message>);

impl MessageLog {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a log from messages in any order.
    pub fn from_unordered(mut messages: Vec<Message>) -> Self {
        // stable: ties stay in insertion order
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Self(messages)
    }

    pub fn into_vec(self) -> Vec<Message> {
        self.0
    }

    pub fn texts(&self) -> Vec<&str> {
        self.0.iter().map(|m| m.text.as_str()).collect()
    }
}

impl Deref for MessageLog {
    type Target = [Message];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Message>> for MessageLog {
    fn from(messages: Vec<Message>) -> Self {
        Self::from_unordered(messages)
    }
}

impl IntoIterator for MessageLog {
    type Item = Message;
    type IntoIter = std::vec::IntoIter<Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Public profile of a registered user (`users/{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub name: Option<String>,
    pub email: String,
    #[serde(default, with = "timestamp::option")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Name if one was given, otherwise the email address.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }
}

/// The signed-in account as reported by the authentication service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
}

/// Input of the sign-in-or-register flow.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// A message that has been built but not yet accepted by the remote store.
///
/// The key is generated once per message, so resending the same
/// `PendingSend` cannot create a second copy when keyed writes are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub key: Uuid,
    pub message: Message,
}

impl PendingSend {
    pub fn new(message: Message) -> Self {
        Self {
            key: Uuid::new_v4(),
            message,
        }
    }
}

/// Slash-separated path of a collection in the remote document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// `users`
    pub fn users() -> Self {
        Self::new("users")
    }

    /// `conversations/{id}/messages`
    pub fn messages(conversation: &ConversationId) -> Self {
        Self(format!("conversations/{}/messages", conversation))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document read from the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A realtime query over one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: CollectionPath,
    pub order_by: Option<(String, Direction)>,
}

impl Query {
    pub fn collection(collection: CollectionPath) -> Self {
        Self {
            collection,
            order_by: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_message_uses_store_field_names() {
        let msg = Message::at("hi", UserId::new("u1"), at(0));
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["text"], "hi");
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_message_accepts_any_rfc3339_offset() {
        let json = r#"{"text":"hey","createdAt":"2024-05-01T12:00:00+02:00","senderId":"u2"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.created_at, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_log_sorts_and_keeps_ties_stable() {
        let u = UserId::new("u1");
        let log = MessageLog::from_unordered(vec![
            Message::at("c", u.clone(), at(3)),
            Message::at("a1", u.clone(), at(1)),
            Message::at("b", u.clone(), at(2)),
            Message::at("a2", u.clone(), at(1)),
        ]);
        assert_eq!(log.texts(), vec!["a1", "a2", "b", "c"]);
    }

    #[test]
    fn test_log_serializes_as_plain_array() {
        let log = MessageLog::from_unordered(vec![Message::at("x", UserId::new("u"), at(5))]);
        let json = serde_json::to_string(&log).unwrap();
        assert!(json.starts_with('['));

        let back: MessageLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let mut profile = UserProfile {
            id: UserId::new("u1"),
            name: Some("Alice".into()),
            email: "alice@example.com".into(),
            created_at: None,
        };
        assert_eq!(profile.display_name(), "Alice");

        profile.name = Some("  ".into());
        assert_eq!(profile.display_name(), "alice@example.com");

        profile.name = None;
        assert_eq!(profile.display_name(), "alice@example.com");
    }

    #[test]
    fn test_conversation_participants() {
        let id = ConversationId::from_ordered(&UserId::new("u1"), &UserId::new("u2"));
        assert_eq!(id.as_str(), "u1_u2");
        assert_eq!(
            id.participants(),
            Some((UserId::new("u1"), UserId::new("u2")))
        );
    }

    #[test]
    fn test_collection_paths() {
        let id = ConversationId::from_ordered(&UserId::new("a"), &UserId::new("b"));
        assert_eq!(CollectionPath::messages(&id).as_str(), "conversations/a_b/messages");
        assert_eq!(CollectionPath::users().as_str(), "users");
    }
}

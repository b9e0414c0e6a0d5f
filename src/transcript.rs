//! Chat transcript: an append-only, insertion-ordered list of messages.
//!
//! The only permitted mutations after a message is pushed are progressive
//! filling of streamed content and attaching a generated asset.

use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person at the keyboard.
    User,
    /// The vendor model (or a local fallback standing in for it).
    Model,
}

/// How a message body should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Text plus a generated image asset.
    Image,
    /// Text plus a generated video asset.
    Video,
    /// Source code.
    Code,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier within the transcript.
    pub id: String,
    /// Author.
    pub role: Role,
    /// Text content (grows while a stream is in flight).
    pub content: String,
    /// Creation time, Unix epoch milliseconds.
    pub timestamp: u64,
    /// Rendering hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    /// Asset reference: a `data:` URL or a file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    /// MIME type of the asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Message {
    /// Create a text message stamped with the current time.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: now_epoch_millis(),
            kind: None,
            asset: None,
            mime_type: None,
        }
    }

    /// Shorthand for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Shorthand for a model message.
    pub fn model(content: impl Into<String>) -> Self {
        Self::new(Role::Model, content)
    }

    /// Builder: set a fixed identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Local time of day (`HH:MM`) for display.
    pub fn display_time(&self) -> String {
        i64::try_from(self.timestamp)
            .ok()
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|utc| {
                utc.with_timezone(&chrono::Local)
                    .format("%H:%M")
                    .to_string()
            })
            .unwrap_or_default()
    }
}

/// Insertion-ordered message list owned by a single panel.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transcript seeded with a welcome message.
    pub fn with_welcome(text: &str) -> Self {
        let mut transcript = Self::new();
        transcript.push(Message::model(text).with_id("welcome"));
        transcript
    }

    /// Append a message and return its id.
    pub fn push(&mut self, message: Message) -> String {
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Replace the content of a streamed message. Returns `false` if unknown.
    pub fn set_content(&mut self, id: &str, content: &str) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                content.clone_into(&mut message.content);
                true
            }
            None => false,
        }
    }

    /// Append a streamed fragment. Returns `false` if unknown.
    pub fn append_content(&mut self, id: &str, fragment: &str) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.content.push_str(fragment);
                true
            }
            None => false,
        }
    }

    /// Attach a generated asset to an existing message. Returns `false` if unknown.
    pub fn attach_asset(
        &mut self,
        id: &str,
        kind: MessageKind,
        asset: String,
        mime_type: Option<String>,
    ) -> bool {
        match self.get_mut(id) {
            Some(message) => {
                message.kind = Some(kind);
                message.asset = Some(asset);
                message.mime_type = mime_type;
                true
            }
            None => false,
        }
    }

    /// Look up a message by id.
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// All messages in insertion order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Current Unix time in milliseconds.
pub fn now_epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_message_is_first() {
        let transcript = Transcript::with_welcome("hello there");
        assert_eq!(transcript.len(), 1);
        let first = &transcript.messages()[0];
        assert_eq!(first.id, "welcome");
        assert_eq!(first.role, Role::Model);
        assert_eq!(first.content, "hello there");
    }

    #[test]
    fn push_preserves_insertion_order() {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("one"));
        transcript.push(Message::model("two"));
        transcript.push(Message::user("three"));
        let contents: Vec<&str> = transcript
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn streamed_content_fills_in_place() {
        let mut transcript = Transcript::new();
        let id = transcript.push(Message::model(""));
        assert!(transcript.append_content(&id, "fn main"));
        assert!(transcript.append_content(&id, "() {}"));
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.get(&id).map(|m| m.content.as_str()), Some("fn main() {}"));
        assert!(!transcript.append_content("missing", "x"));
    }

    #[test]
    fn attach_asset_sets_kind_and_mime() {
        let mut transcript = Transcript::new();
        let id = transcript.push(Message::model("a fox"));
        assert!(transcript.attach_asset(
            &id,
            MessageKind::Image,
            "data:image/png;base64,AAAA".into(),
            Some("image/png".into()),
        ));
        let message = transcript.get(&id).unwrap_or_else(|| unreachable!());
        assert_eq!(message.kind, Some(MessageKind::Image));
        assert_eq!(message.mime_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn message_ids_are_unique() {
        let a = Message::user("x");
        let b = Message::user("x");
        assert_ne!(a.id, b.id);
        assert!(a.timestamp > 0);
    }
}

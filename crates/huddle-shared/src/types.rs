use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a user record, as issued by the record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a chat record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ChatId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of chat, which decides how a sender is shown to the other
/// participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatKind {
    /// Direct chat between friends: senders appear under their name.
    #[serde(rename = "dm")]
    Direct,
    /// Anonymous group chat: senders appear under their tag.
    #[serde(rename = "group")]
    Group,
}

impl ChatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "dm",
            Self::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dm" => Some(Self::Direct),
            "group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// The public face of a user: the pair of names a message can be relayed
/// under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayIdentity {
    /// Full display name, shown in direct chats.
    pub name: String,
    /// Pseudonymous tag, shown in group chats.
    pub tag: String,
}

impl DisplayIdentity {
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
        }
    }

    /// The name to relay a message under in a chat of the given kind.
    pub fn display_for(&self, kind: ChatKind) -> &str {
        match kind {
            ChatKind::Direct => &self.name,
            ChatKind::Group => &self.tag,
        }
    }
}

//! Records kept by the store.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use huddle_shared::{ChatId, ChatKind, DisplayIdentity, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered user, as far as chat relay and matching are concerned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Full display name, shown to friends in direct chats.
    pub name: String,
    /// Pseudonymous tag, shown in anonymous group chats.
    pub tag: String,
    pub interests: BTreeSet<String>,
}

impl User {
    pub fn identity(&self) -> DisplayIdentity {
        DisplayIdentity::new(self.name.clone(), self.tag.clone())
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A direct or group chat. Participants are fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    /// Participants in insertion order, without duplicates.
    pub participants: Vec<UserId>,
    pub kind: ChatKind,
    pub description: String,
    /// Interests every member shares (group chats only).
    pub common_interests: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(
        kind: ChatKind,
        participants: impl IntoIterator<Item = UserId>,
        description: impl Into<String>,
    ) -> Self {
        let mut unique = Vec::new();
        for participant in participants {
            if !unique.contains(&participant) {
                unique.push(participant);
            }
        }
        Self {
            id: ChatId::new(),
            participants: unique,
            kind,
            description: description.into(),
            common_interests: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    /// A group chat formed around shared interests.
    pub fn group(
        participants: impl IntoIterator<Item = UserId>,
        common_interests: BTreeSet<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            common_interests,
            ..Self::new(ChatKind::Group, participants, description)
        }
    }
}

// ---------------------------------------------------------------------------
// Pending messages
// ---------------------------------------------------------------------------

/// Per-user record of messages awaiting delivery, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingMessages {
    pub user_id: UserId,
    /// Serialized outbound frames, in append order.
    pub messages: Vec<String>,
    /// Anonymous group chats the user has been matched into.
    pub active_anon_chats: Vec<ChatId>,
}

impl PendingMessages {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            messages: Vec::new(),
            active_anon_chats: Vec::new(),
        }
    }
}

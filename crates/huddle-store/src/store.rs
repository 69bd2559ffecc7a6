//! The record store seam used by the server.
//!
//! [`RecordStore`] is the narrow set of typed operations the chat hub and
//! the matching workflow need. Each call is atomic on its own; callers that
//! read-modify-write a record are responsible for serializing access to it.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use huddle_shared::matching::WaitingUser;
use huddle_shared::{ChatId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chat, PendingMessages, User};

pub trait RecordStore: Send + Sync {
    fn save_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &UserId) -> Result<User>;

    fn create_chat(&self, chat: &Chat) -> Result<()>;
    fn get_chat(&self, id: &ChatId) -> Result<Chat>;

    fn get_pending(&self, user_id: &UserId) -> Result<PendingMessages>;
    fn save_pending(&self, record: &PendingMessages) -> Result<()>;

    fn enqueue_waiting(&self, user: &WaitingUser) -> Result<()>;
    fn is_waiting(&self, user_id: &UserId) -> Result<bool>;
    fn list_waiting(&self) -> Result<Vec<WaitingUser>>;
    /// Store a newly formed group chat and remove its participants from
    /// the waiting pool as one atomic step. Returns how many waiting
    /// users were removed.
    fn create_group_chat(&self, chat: &Chat) -> Result<usize>;
}

/// [`RecordStore`] backed by a single SQLite connection.
pub struct SqliteStore {
    db: Mutex<Database>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_database(Database::open_at(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RecordStore for SqliteStore {
    fn save_user(&self, user: &User) -> Result<()> {
        self.db()?.save_user(user)
    }

    fn get_user(&self, id: &UserId) -> Result<User> {
        self.db()?.get_user(id)
    }

    fn create_chat(&self, chat: &Chat) -> Result<()> {
        self.db()?.create_chat(chat)
    }

    fn get_chat(&self, id: &ChatId) -> Result<Chat> {
        self.db()?.get_chat(id)
    }

    fn get_pending(&self, user_id: &UserId) -> Result<PendingMessages> {
        self.db()?.get_pending(user_id)
    }

    fn save_pending(&self, record: &PendingMessages) -> Result<()> {
        self.db()?.save_pending(record)
    }

    fn enqueue_waiting(&self, user: &WaitingUser) -> Result<()> {
        self.db()?.enqueue_waiting(user)
    }

    fn is_waiting(&self, user_id: &UserId) -> Result<bool> {
        self.db()?.is_waiting(user_id)
    }

    fn list_waiting(&self) -> Result<Vec<WaitingUser>> {
        self.db()?.list_waiting()
    }

    fn create_group_chat(&self, chat: &Chat) -> Result<usize> {
        self.db()?.create_group_chat(chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_sqlite_store_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteStore::open(&dir.path().join("huddle.db")).unwrap());

        let user = User {
            id: UserId::from("u1"),
            name: "Grace".to_string(),
            tag: "brave_heron.K2p9Z".to_string(),
            interests: ["hiking".to_string()].into(),
        };
        store.save_user(&user).unwrap();

        let mut pending = store.get_pending(&user.id).unwrap();
        pending.messages.push("{}".to_string());
        store.save_pending(&pending).unwrap();

        assert_eq!(store.get_pending(&user.id).unwrap().messages.len(), 1);
        assert_eq!(store.get_user(&user.id).unwrap(), user);
    }
}

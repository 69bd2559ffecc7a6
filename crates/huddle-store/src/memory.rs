//! In-process [`RecordStore`] used by tests and local experiments.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use huddle_shared::matching::WaitingUser;
use huddle_shared::{ChatId, UserId};

use crate::error::{Result, StoreError};
use crate::models::{Chat, PendingMessages, User};
use crate::store::RecordStore;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    chats: HashMap<ChatId, Chat>,
    pending: HashMap<UserId, PendingMessages>,
    waiting: Vec<WaitingUser>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RecordStore for MemoryStore {
    fn save_user(&self, user: &User) -> Result<()> {
        let mut t = self.tables()?;
        t.users.insert(user.id.clone(), user.clone());
        t.pending
            .entry(user.id.clone())
            .or_insert_with(|| PendingMessages::empty(user.id.clone()));
        Ok(())
    }

    fn get_user(&self, id: &UserId) -> Result<User> {
        self.tables()?.users.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn create_chat(&self, chat: &Chat) -> Result<()> {
        let mut t = self.tables()?;
        if t.chats.contains_key(&chat.id) {
            return Err(StoreError::AlreadyExists);
        }
        t.chats.insert(chat.id.clone(), chat.clone());
        Ok(())
    }

    fn get_chat(&self, id: &ChatId) -> Result<Chat> {
        self.tables()?.chats.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn get_pending(&self, user_id: &UserId) -> Result<PendingMessages> {
        self.tables()?
            .pending
            .get(user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn save_pending(&self, record: &PendingMessages) -> Result<()> {
        self.tables()?
            .pending
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    fn enqueue_waiting(&self, user: &WaitingUser) -> Result<()> {
        let mut t = self.tables()?;
        if t.waiting.iter().any(|w| w.id == user.id) {
            return Err(StoreError::AlreadyExists);
        }
        t.waiting.push(user.clone());
        Ok(())
    }

    fn is_waiting(&self, user_id: &UserId) -> Result<bool> {
        Ok(self.tables()?.waiting.iter().any(|w| &w.id == user_id))
    }

    fn list_waiting(&self) -> Result<Vec<WaitingUser>> {
        Ok(self.tables()?.waiting.clone())
    }

    fn create_group_chat(&self, chat: &Chat) -> Result<usize> {
        let mut t = self.tables()?;
        if t.chats.contains_key(&chat.id) {
            return Err(StoreError::AlreadyExists);
        }
        t.chats.insert(chat.id.clone(), chat.clone());

        let before = t.waiting.len();
        t.waiting.retain(|w| !chat.participants.contains(&w.id));
        Ok(before - t.waiting.len())
    }
}

//! Anonymous group formation.
//!
//! A user asking for a chat joins the waiting pool. Each request then runs
//! one matching pass over the requester and the longest-waiting users who
//! share an interest with them; if a group is found a chat is created for
//! it, its members leave the pool and the hub tells them about it. Passes
//! are serialized so two requests can never place the same waiting user in
//! two chats.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use huddle_shared::constants::GROUP_DESCRIPTIONS;
use huddle_shared::matching::{self, WaitingUser};
use huddle_shared::UserId;
use huddle_store::{Chat, RecordStore, StoreError};

use crate::error::ServerError;
use crate::hub::HubHandle;

pub struct ChatFinder {
    store: Arc<dyn RecordStore>,
    hub: HubHandle,
    max_pool: usize,
    pass: Mutex<()>,
}

impl ChatFinder {
    pub fn new(store: Arc<dyn RecordStore>, hub: HubHandle, max_pool: usize) -> Self {
        Self {
            store,
            hub,
            max_pool,
            pass: Mutex::new(()),
        }
    }

    /// Whether the user may ask for a new chat, i.e. is not already waiting.
    pub fn can_find_chat(&self, user_id: &UserId) -> Result<bool, ServerError> {
        Ok(!self.store.is_waiting(user_id)?)
    }

    /// Put the user in the waiting pool and try to form a group.
    ///
    /// Returns the chat formed by this pass, if any. It need not include
    /// the requesting user.
    pub async fn find_chat(&self, user_id: &UserId) -> Result<Option<Chat>, ServerError> {
        let user = self.store.get_user(user_id)?;

        let _pass = self.pass.lock().await;

        let requester = WaitingUser::new(user.id, user.interests);
        match self.store.enqueue_waiting(&requester) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists) => {
                return Err(ServerError::Conflict(
                    "Already waiting for a chat".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        }
        debug!(user = %user_id, "Joined waiting pool");

        self.match_waiting(&requester)
    }

    fn match_waiting(&self, requester: &WaitingUser) -> Result<Option<Chat>, ServerError> {
        let pool = self.store.list_waiting()?;
        let window = matching::candidates_for(requester, &pool, self.max_pool);
        let Some(group) = matching::first_group(&window) else {
            debug!(
                waiting = pool.len(),
                candidates = window.len(),
                "No group formed"
            );
            return Ok(None);
        };

        let chat = Chat::group(group.members, group.shared_interests, random_description());
        self.store.create_group_chat(&chat)?;

        info!(
            chat = %chat.id,
            members = chat.participants.len(),
            interests = ?chat.common_interests,
            "Group chat formed"
        );

        if !self.hub.chat_created(chat.clone()) {
            warn!(chat = %chat.id, "Hub unavailable, members were not notified");
        }

        Ok(Some(chat))
    }
}

fn random_description() -> &'static str {
    GROUP_DESCRIPTIONS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(GROUP_DESCRIPTIONS[0])
}

//! The connection registry.
//!
//! A single [`Hub`] task owns the map of live connections. Connection
//! adapters and the chat-finder talk to it through a [`HubHandle`], whose
//! commands are processed one at a time in arrival order. Nothing else
//! touches the map, and every read-modify-write of a user's pending-message
//! record happens inside this loop, so no per-user locking is needed.
//!
//! Store calls are made inline: a slow store delays every other command.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use huddle_shared::protocol::{ChatMessage, OutboundFrame};
use huddle_shared::{ChatKind, DisplayIdentity, UserId};
use huddle_store::{Chat, RecordStore, StoreError};

/// Distinguishes successive connections of the same user.
pub type ConnectionId = u64;

/// A user with a live connection.
#[derive(Debug)]
pub struct ConnectedUser {
    pub id: UserId,
    pub connection: ConnectionId,
    pub identity: DisplayIdentity,
    /// Serialized frames for the connection's writer. Dropping the sender
    /// closes the queue and stops the writer.
    pub outbound: mpsc::Sender<String>,
}

/// Commands processed by the hub loop.
#[derive(Debug)]
pub enum HubCommand {
    /// Add (or replace) a live connection and flush its pending messages.
    Register(ConnectedUser),
    /// Drop a live connection, if it is still the registered one.
    Unregister {
        user_id: UserId,
        connection: ConnectionId,
    },
    /// Relay a message to the other participants of its chat.
    Broadcast(ChatMessage),
    /// Announce a newly formed group chat to its members.
    ChatCreated(Chat),
    /// Ask whether a user currently has a live connection.
    IsOnline(UserId, oneshot::Sender<bool>),
}

/// Cloneable sending side of the hub.
///
/// Every method returns `false` once the hub loop has stopped.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    pub fn new(tx: mpsc::UnboundedSender<HubCommand>) -> Self {
        Self { tx }
    }

    pub fn register(&self, user: ConnectedUser) -> bool {
        self.tx.send(HubCommand::Register(user)).is_ok()
    }

    pub fn unregister(&self, user_id: UserId, connection: ConnectionId) -> bool {
        self.tx
            .send(HubCommand::Unregister {
                user_id,
                connection,
            })
            .is_ok()
    }

    pub fn broadcast(&self, message: ChatMessage) -> bool {
        self.tx.send(HubCommand::Broadcast(message)).is_ok()
    }

    pub fn chat_created(&self, chat: Chat) -> bool {
        self.tx.send(HubCommand::ChatCreated(chat)).is_ok()
    }

    /// `None` if the hub is gone. Because commands are processed in order,
    /// the answer reflects every command sent before this one.
    pub async fn is_online(&self, user_id: UserId) -> Option<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(HubCommand::IsOnline(user_id, reply_tx)).ok()?;
        reply_rx.await.ok()
    }
}

/// What happened to one recipient's copy of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Live,
    Stored,
    Dropped,
}

pub struct Hub {
    store: Arc<dyn RecordStore>,
    clients: HashMap<UserId, ConnectedUser>,
}

impl Hub {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            clients: HashMap::new(),
        }
    }

    /// Run a hub in a background tokio task and return its handle.
    pub fn spawn(store: Arc<dyn RecordStore>) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::new(store).run(rx));
        HubHandle::new(tx)
    }

    /// Process commands until every handle has been dropped.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<HubCommand>) {
        info!("Hub started");
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        info!(online = self.clients.len(), "Hub stopped");
    }

    pub fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(user) => self.register(user),
            HubCommand::Unregister {
                user_id,
                connection,
            } => self.unregister(&user_id, connection),
            HubCommand::Broadcast(message) => self.broadcast(&message),
            HubCommand::ChatCreated(chat) => self.chat_created(&chat),
            HubCommand::IsOnline(user_id, reply) => {
                let _ = reply.send(self.is_online(&user_id));
            }
        }
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.clients.contains_key(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.clients.len()
    }

    // -----------------------------------------------------------------------
    // Register / unregister
    // -----------------------------------------------------------------------

    pub fn register(&mut self, user: ConnectedUser) {
        let user_id = user.id.clone();
        let connection = user.connection;

        // Replacing the entry drops the old sender, which closes the old
        // connection's queue.
        if let Some(previous) = self.clients.insert(user_id.clone(), user) {
            debug!(
                user = %user_id,
                old_connection = previous.connection,
                new_connection = connection,
                "Replaced live connection"
            );
        }

        info!(
            user = %user_id,
            connection,
            online = self.clients.len(),
            "User connected"
        );

        self.drain_pending(&user_id);
    }

    pub fn unregister(&mut self, user_id: &UserId, connection: ConnectionId) {
        match self.clients.get(user_id) {
            Some(client) if client.connection == connection => {
                self.clients.remove(user_id);
                info!(
                    user = %user_id,
                    connection,
                    online = self.clients.len(),
                    "User disconnected"
                );
            }
            Some(client) => {
                debug!(
                    user = %user_id,
                    stale = connection,
                    current = client.connection,
                    "Ignoring unregister from a replaced connection"
                );
            }
            None => {}
        }
    }

    /// Push the user's stored messages onto their queue, oldest first, and
    /// keep whatever did not fit for a later connect.
    fn drain_pending(&mut self, user_id: &UserId) {
        let mut record = match self.store.get_pending(user_id) {
            Ok(record) => record,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Skipping pending drain");
                return;
            }
        };

        if record.messages.is_empty() {
            return;
        }

        let Some(client) = self.clients.get(user_id) else {
            return;
        };

        let mut delivered = 0;
        for payload in &record.messages {
            if client.outbound.try_send(payload.clone()).is_err() {
                break;
            }
            delivered += 1;
        }

        let remaining = record.messages.len() - delivered;
        record.messages.drain(..delivered);

        if let Err(e) = self.store.save_pending(&record) {
            error!(
                user = %user_id,
                error = %e,
                "Failed to clear delivered pending messages"
            );
            return;
        }

        if remaining > 0 {
            warn!(
                user = %user_id,
                delivered,
                remaining,
                "Outbound queue filled during drain; keeping the rest"
            );
        } else {
            debug!(user = %user_id, delivered, "Flushed pending messages");
        }
    }

    // -----------------------------------------------------------------------
    // Relay
    // -----------------------------------------------------------------------

    pub fn broadcast(&mut self, message: &ChatMessage) {
        let chat = match self.store.get_chat(&message.chat_id) {
            Ok(chat) => chat,
            Err(e) => {
                warn!(chat = %message.chat_id, error = %e, "Dropping message for unknown chat");
                return;
            }
        };

        if !chat.participants.contains(&message.sender_id) {
            warn!(
                chat = %chat.id,
                sender = %message.sender_id,
                "Dropping message from non-participant"
            );
            return;
        }

        let Some(identity) = self.sender_identity(&message.sender_id) else {
            warn!(sender = %message.sender_id, "Dropping message from unknown sender");
            return;
        };

        let payload = match message.render(identity.display_for(chat.kind)).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(chat = %chat.id, error = %e, "Failed to serialize message");
                return;
            }
        };

        let mut live = 0;
        let mut stored = 0;
        for participant in chat.participants.iter().filter(|p| **p != message.sender_id) {
            match self.deliver(participant, payload.clone()) {
                Delivery::Live => live += 1,
                Delivery::Stored => stored += 1,
                Delivery::Dropped => {}
            }
        }

        debug!(chat = %chat.id, live, stored, "Message relayed");
    }

    /// Record a new group chat for each member and send them a notice.
    pub fn chat_created(&mut self, chat: &Chat) {
        let payload = match OutboundFrame::notice(chat.id.clone(), &chat.description).to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!(chat = %chat.id, error = %e, "Failed to serialize chat notice");
                return;
            }
        };

        for member in &chat.participants {
            if chat.kind == ChatKind::Group {
                if let Err(e) = self.record_active_chat(member, chat) {
                    warn!(user = %member, chat = %chat.id, error = %e, "Failed to record active chat");
                }
            }
            self.deliver(member, payload.clone());
        }

        info!(chat = %chat.id, members = chat.participants.len(), "Chat announced");
    }

    fn sender_identity(&self, sender_id: &UserId) -> Option<DisplayIdentity> {
        if let Some(client) = self.clients.get(sender_id) {
            return Some(client.identity.clone());
        }
        self.store.get_user(sender_id).ok().map(|user| user.identity())
    }

    /// Hand a payload to a recipient's live queue, or persist it if they
    /// have no live connection.
    fn deliver(&mut self, recipient: &UserId, payload: String) -> Delivery {
        let payload = match self.clients.get(recipient) {
            Some(client) => match client.outbound.try_send(payload) {
                Ok(()) => return Delivery::Live,
                Err(TrySendError::Full(_)) => {
                    // A full queue means the writer has stalled.
                    warn!(user = %recipient, "Outbound queue full, forcing disconnect");
                    self.clients.remove(recipient);
                    return Delivery::Dropped;
                }
                Err(TrySendError::Closed(payload)) => {
                    // The writer is already gone; treat the user as offline.
                    debug!(user = %recipient, "Outbound queue closed, removing connection");
                    self.clients.remove(recipient);
                    payload
                }
            },
            None => payload,
        };

        match self.append_pending(recipient, payload) {
            Ok(()) => Delivery::Stored,
            Err(e) => {
                warn!(user = %recipient, error = %e, "Failed to store pending message");
                Delivery::Dropped
            }
        }
    }

    fn append_pending(&self, user_id: &UserId, payload: String) -> Result<(), StoreError> {
        let mut record = self.store.get_pending(user_id)?;
        record.messages.push(payload);
        self.store.save_pending(&record)
    }

    fn record_active_chat(&self, user_id: &UserId, chat: &Chat) -> Result<(), StoreError> {
        let mut record = self.store.get_pending(user_id)?;
        if !record.active_anon_chats.contains(&chat.id) {
            record.active_anon_chats.push(chat.id.clone());
            self.store.save_pending(&record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use huddle_shared::{ChatId, ChatKind};
    use huddle_store::{MemoryStore, User};

    static NEXT: AtomicU64 = AtomicU64::new(1);

    fn seed_user(store: &MemoryStore, id: &str) {
        store
            .save_user(&User {
                id: UserId::from(id),
                name: format!("{id} fullname"),
                tag: format!("{id}.tag"),
                interests: Default::default(),
            })
            .unwrap();
    }

    fn seed_chat(store: &MemoryStore, kind: ChatKind, members: &[&str]) -> ChatId {
        let chat = Chat::new(kind, members.iter().map(|m| UserId::from(*m)), "test");
        store.create_chat(&chat).unwrap();
        chat.id
    }

    fn connect(id: &str, capacity: usize) -> (ConnectedUser, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let user = ConnectedUser {
            id: UserId::from(id),
            connection: NEXT.fetch_add(1, Ordering::Relaxed),
            identity: DisplayIdentity::new(format!("{id} fullname"), format!("{id}.tag")),
            outbound: tx,
        };
        (user, rx)
    }

    fn message(chat_id: &ChatId, sender: &str, content: &str) -> ChatMessage {
        ChatMessage {
            chat_id: chat_id.clone(),
            sender_id: UserId::from(sender),
            content: content.to_string(),
            timestamp: 1_700_000_000,
        }
    }

    fn pending(store: &MemoryStore, id: &str) -> Vec<String> {
        store.get_pending(&UserId::from(id)).unwrap().messages
    }

    fn setup(users: &[&str]) -> (Arc<MemoryStore>, Hub) {
        let store = Arc::new(MemoryStore::new());
        for user in users {
            seed_user(&store, user);
        }
        let hub = Hub::new(store.clone());
        (store, hub)
    }

    #[test]
    fn test_register_unregister_sequences() {
        let (_store, mut hub) = setup(&["a"]);
        let alice = UserId::from("a");

        let (user, _rx) = connect("a", 8);
        let conn = user.connection;
        hub.register(user);
        assert!(hub.is_online(&alice));

        hub.unregister(&alice, conn);
        assert!(!hub.is_online(&alice));

        // Double unregister is a no-op.
        hub.unregister(&alice, conn);
        assert!(!hub.is_online(&alice));

        let (user, _rx2) = connect("a", 8);
        hub.register(user);
        assert!(hub.is_online(&alice));
        assert_eq!(hub.online_count(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_replaces_and_stale_unregister_is_ignored() {
        let (_store, mut hub) = setup(&["a"]);
        let alice = UserId::from("a");

        let (first, mut first_rx) = connect("a", 8);
        let first_conn = first.connection;
        hub.register(first);

        let (second, _second_rx) = connect("a", 8);
        hub.register(second);

        // The first connection's queue is closed by the replacement.
        assert_eq!(first_rx.recv().await, None);

        hub.unregister(&alice, first_conn);
        assert!(hub.is_online(&alice));
    }

    #[tokio::test]
    async fn test_unregister_closes_queue() {
        let (_store, mut hub) = setup(&["a"]);
        let (user, mut rx) = connect("a", 8);
        let conn = user.connection;
        hub.register(user);
        hub.unregister(&UserId::from("a"), conn);

        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_dm_relays_display_name() {
        let (store, mut hub) = setup(&["a", "b"]);
        let chat = seed_chat(&store, ChatKind::Direct, &["a", "b"]);

        let (a, mut a_rx) = connect("a", 8);
        let (b, mut b_rx) = connect("b", 8);
        hub.register(a);
        hub.register(b);

        hub.broadcast(&message(&chat, "a", "hello"));

        let frame = OutboundFrame::from_json(&b_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame.sender, "a fullname");
        assert_eq!(frame.content, "hello");
        assert_eq!(frame.chat_id, chat);
        assert_eq!(frame.timestamp, 1_700_000_000);

        // Never back to the sender.
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn test_group_relays_tag_to_every_recipient() {
        let (store, mut hub) = setup(&["a", "b", "c", "d"]);
        let chat = seed_chat(&store, ChatKind::Group, &["a", "b", "c", "d"]);

        let mut receivers = Vec::new();
        for id in ["a", "b", "c"] {
            let (user, rx) = connect(id, 8);
            hub.register(user);
            receivers.push(rx);
        }

        hub.broadcast(&message(&chat, "a", "hi all"));

        for rx in &mut receivers[1..] {
            let frame = OutboundFrame::from_json(&rx.try_recv().unwrap()).unwrap();
            assert_eq!(frame.sender, "a.tag");
            assert_ne!(frame.sender, "a");
        }
        let stored = pending(&store, "d");
        assert_eq!(stored.len(), 1);
        assert_eq!(OutboundFrame::from_json(&stored[0]).unwrap().sender, "a.tag");
    }

    #[test]
    fn test_offline_recipient_gets_exactly_one_append() {
        let (store, mut hub) = setup(&["a", "b"]);
        let chat = seed_chat(&store, ChatKind::Direct, &["a", "b"]);
        let (a, _a_rx) = connect("a", 8);
        hub.register(a);

        for (i, text) in ["one", "two", "three"].into_iter().enumerate() {
            hub.broadcast(&message(&chat, "a", text));

            let stored = pending(&store, "b");
            assert_eq!(stored.len(), i + 1);
            let last = OutboundFrame::from_json(stored.last().unwrap()).unwrap();
            assert_eq!(last.content, text);
        }
    }

    #[test]
    fn test_sender_alone_in_chat_gets_nothing() {
        let (store, mut hub) = setup(&["a"]);
        let chat = seed_chat(&store, ChatKind::Group, &["a"]);
        let (a, mut a_rx) = connect("a", 8);
        hub.register(a);

        hub.broadcast(&message(&chat, "a", "echo?"));

        assert!(a_rx.try_recv().is_err());
        assert!(pending(&store, "a").is_empty());
    }

    #[test]
    fn test_offline_sender_uses_stored_identity() {
        let (store, mut hub) = setup(&["a", "b"]);
        let chat = seed_chat(&store, ChatKind::Direct, &["a", "b"]);
        let (b, mut b_rx) = connect("b", 8);
        hub.register(b);

        hub.broadcast(&message(&chat, "a", "sent just before leaving"));

        let frame = OutboundFrame::from_json(&b_rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame.sender, "a fullname");
    }

    #[test]
    fn test_unknown_chat_and_outsider_are_dropped() {
        let (store, mut hub) = setup(&["a", "b", "x"]);
        let chat = seed_chat(&store, ChatKind::Direct, &["a", "b"]);

        hub.broadcast(&message(&ChatId::from("missing"), "a", "lost"));
        hub.broadcast(&message(&chat, "x", "let me in"));

        assert!(pending(&store, "a").is_empty());
        assert!(pending(&store, "b").is_empty());
    }

    #[test]
    fn test_drain_on_register_preserves_order_and_empties_record() {
        let (store, mut hub) = setup(&["a", "b"]);
        let chat = seed_chat(&store, ChatKind::Direct, &["a", "b"]);
        for text in ["1", "2", "3", "4"] {
            hub.broadcast(&message(&chat, "a", text));
        }
        assert_eq!(pending(&store, "b").len(), 4);

        let (b, mut b_rx) = connect("b", 8);
        hub.register(b);

        let mut received = Vec::new();
        while let Ok(payload) = b_rx.try_recv() {
            received.push(OutboundFrame::from_json(&payload).unwrap().content);
        }
        assert_eq!(received, ["1", "2", "3", "4"]);
        assert!(pending(&store, "b").is_empty());
    }

    #[test]
    fn test_drain_keeps_overflow_for_later() {
        let (store, mut hub) = setup(&["a", "b"]);
        let chat = seed_chat(&store, ChatKind::Direct, &["a", "b"]);
        for text in ["1", "2", "3"] {
            hub.broadcast(&message(&chat, "a", text));
        }

        let (b, mut b_rx) = connect("b", 2);
        hub.register(b);

        assert!(b_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
        let rest = pending(&store, "b");
        assert_eq!(rest.len(), 1);
        assert_eq!(OutboundFrame::from_json(&rest[0]).unwrap().content, "3");
    }

    #[test]
    fn test_register_without_pending_record_still_succeeds() {
        let store = Arc::new(MemoryStore::new());
        let mut hub = Hub::new(store);
        let (ghost, _rx) = connect("ghost", 8);
        hub.register(ghost);
        assert!(hub.is_online(&UserId::from("ghost")));
    }

    #[test]
    fn test_full_queue_forces_disconnect_without_persisting() {
        let (store, mut hub) = setup(&["a", "b"]);
        let chat = seed_chat(&store, ChatKind::Direct, &["a", "b"]);
        let (b, _b_rx) = connect("b", 1);
        hub.register(b);

        hub.broadcast(&message(&chat, "a", "fits"));
        assert!(hub.is_online(&UserId::from("b")));

        hub.broadcast(&message(&chat, "a", "overflows"));
        assert!(!hub.is_online(&UserId::from("b")));
        assert!(pending(&store, "b").is_empty());
    }

    #[test]
    fn test_closed_queue_is_treated_as_offline() {
        let (store, mut hub) = setup(&["a", "b"]);
        let chat = seed_chat(&store, ChatKind::Direct, &["a", "b"]);
        let (b, b_rx) = connect("b", 8);
        hub.register(b);
        drop(b_rx);

        hub.broadcast(&message(&chat, "a", "are you there"));

        assert!(!hub.is_online(&UserId::from("b")));
        assert_eq!(pending(&store, "b").len(), 1);
    }

    #[test]
    fn test_chat_created_notifies_members() {
        let (store, mut hub) = setup(&["a", "b", "c"]);
        let (a, mut a_rx) = connect("a", 8);
        hub.register(a);

        let chat = Chat::group(
            ["a", "b", "c"].map(UserId::from),
            ["chess".to_string()].into(),
            "At The Bar",
        );
        store.create_chat(&chat).unwrap();
        hub.chat_created(&chat);

        let notice = OutboundFrame::from_json(&a_rx.try_recv().unwrap()).unwrap();
        assert_eq!(notice.chat_id, chat.id);
        assert_eq!(notice.content, "At The Bar");

        for id in ["a", "b", "c"] {
            let record = store.get_pending(&UserId::from(id)).unwrap();
            assert_eq!(record.active_anon_chats, vec![chat.id.clone()]);
        }
        assert!(pending(&store, "a").is_empty());
        assert_eq!(pending(&store, "b").len(), 1);
        assert_eq!(pending(&store, "c").len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_hub_processes_in_order() {
        let store = Arc::new(MemoryStore::new());
        seed_user(&store, "a");
        seed_user(&store, "b");
        let chat = seed_chat(&store, ChatKind::Direct, &["a", "b"]);
        let handle = Hub::spawn(store.clone());

        let (b, mut b_rx) = connect("b", 8);
        let b_conn = b.connection;
        assert!(handle.register(b));
        assert!(handle.broadcast(message(&chat, "a", "first")));
        assert!(handle.broadcast(message(&chat, "a", "second")));
        assert_eq!(handle.is_online(UserId::from("b")).await, Some(true));

        let first = OutboundFrame::from_json(&b_rx.recv().await.unwrap()).unwrap();
        let second = OutboundFrame::from_json(&b_rx.recv().await.unwrap()).unwrap();
        assert_eq!((first.content.as_str(), second.content.as_str()), ("first", "second"));

        assert!(handle.unregister(UserId::from("b"), b_conn));
        assert_eq!(handle.is_online(UserId::from("b")).await, Some(false));
        assert_eq!(b_rx.recv().await, None);
    }
}

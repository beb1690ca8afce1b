//! Shared hub state: the connection registry and the message store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message as WsMessage;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use murmur_proto::message::{ClientId, Message, MessageId, MessageStatus};

/// Shared hub state holding the per-user connection registry and the
/// in-memory message store.
#[derive(Default)]
pub struct HubState {
    /// Maps user id to the sender half of that user's socket writer task.
    connections: RwLock<HashMap<String, mpsc::UnboundedSender<WsMessage>>>,
    /// All stored messages, in arrival order.
    messages: Mutex<Vec<Message>>,
    /// Server message id counter.
    next_id: AtomicU64,
}

impl HubState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user's socket, replacing any previous connection (the
    /// old writer task sees its channel close and shuts down).
    pub fn register(
        &self,
        user_id: &str,
        sender: mpsc::UnboundedSender<WsMessage>,
    ) -> Option<mpsc::UnboundedSender<WsMessage>> {
        self.connections
            .write()
            .insert(user_id.to_owned(), sender)
    }

    /// Removes a user's socket from the registry.
    pub fn unregister(&self, user_id: &str) {
        self.connections.write().remove(user_id);
    }

    /// Returns a clone of the sender for the given user, if connected.
    #[must_use]
    pub fn sender_for(&self, user_id: &str) -> Option<mpsc::UnboundedSender<WsMessage>> {
        self.connections.read().get(user_id).cloned()
    }

    /// Sends a close frame to every connected user. Useful for tests that
    /// exercise client reconnect behavior.
    pub fn close_all_connections(&self) {
        for (user_id, sender) in self.connections.read().iter() {
            tracing::info!(%user_id, "sending close frame");
            let _ = sender.send(WsMessage::Close(None));
        }
    }

    /// Stores an incoming message, idempotently by `client_id`.
    ///
    /// A repeat of an already-confirmed `client_id` returns the existing
    /// record unchanged; a fresh message gets a server id and `sent` status.
    pub fn insert_message(&self, mut message: Message) -> Message {
        let mut messages = self.messages.lock();
        if let Some(existing) = messages
            .iter()
            .find(|m| m.client_id == message.client_id)
        {
            return existing.clone();
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        message.id = MessageId::new(format!("m{n}"));
        message.status = MessageStatus::Sent;
        messages.push(message.clone());
        message
    }

    /// Messages visible to `user_id`, newest first, optionally only those
    /// created after `last_sync`, then paged by offset/limit.
    #[must_use]
    pub fn page_for(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
        last_sync: Option<DateTime<Utc>>,
    ) -> Vec<Message> {
        let mut visible: Vec<Message> = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.sender_id == user_id || m.receiver_id == user_id)
            .filter(|m| last_sync.is_none_or(|watermark| m.created_at > watermark))
            .cloned()
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        visible.into_iter().skip(offset).take(limit).collect()
    }

    /// Looks up a stored message by server id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Message> {
        self.messages
            .lock()
            .iter()
            .find(|m| m.id.as_str() == id)
            .cloned()
    }

    /// Soft-deletes a message for `user_id`. Returns `false` if unknown.
    pub fn delete(&self, id: &str, user_id: &str, for_everyone: bool) -> bool {
        let mut messages = self.messages.lock();
        let Some(message) = messages.iter_mut().find(|m| m.id.as_str() == id) else {
            return false;
        };
        if for_everyone {
            message.deleted_for_everyone = true;
        } else if message.sender_id == user_id {
            message.deleted_by_sender = true;
        } else {
            message.deleted_by_receiver = true;
        }
        true
    }

    /// Toggles `user_id`'s reaction with `emoji`; returns the updated
    /// reaction map, or `None` for an unknown message.
    pub fn toggle_reaction(
        &self,
        id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Option<murmur_proto::message::Reactions> {
        let mut messages = self.messages.lock();
        let message = messages.iter_mut().find(|m| m.id.as_str() == id)?;
        let users = message.reactions.entry(emoji.to_owned()).or_default();
        if !users.insert(user_id.to_owned()) {
            users.remove(user_id);
        }
        if users.is_empty() {
            message.reactions.remove(emoji);
        }
        Some(message.reactions.clone())
    }

    /// Marks a message read at `read_at`. Returns the sender id so the
    /// caller can push a `messages_read` frame, or `None` for an unknown
    /// message.
    pub fn mark_read(&self, id: &str, read_at: DateTime<Utc>) -> Option<String> {
        let mut messages = self.messages.lock();
        let message = messages.iter_mut().find(|m| m.id.as_str() == id)?;
        message.status = MessageStatus::Read;
        message.read_at = Some(read_at);
        Some(message.sender_id.clone())
    }

    /// Marks a message delivered at `delivered_at`, keeping `read` sticky.
    pub fn mark_delivered(&self, id: &str, delivered_at: DateTime<Utc>) {
        let mut messages = self.messages.lock();
        if let Some(message) = messages.iter_mut().find(|m| m.id.as_str() == id) {
            if message.status != MessageStatus::Read {
                message.status = MessageStatus::Delivered;
            }
            message.delivered_at = Some(delivered_at);
        }
    }

    /// True if a stored message carries this `client_id`.
    #[must_use]
    pub fn knows_client_id(&self, client_id: &ClientId) -> bool {
        self.messages
            .lock()
            .iter()
            .any(|m| &m.client_id == client_id)
    }
}

//! The active message list.
//!
//! Newest-first ordering with two secondary indexes: `client_id` (the
//! idempotency key correlating optimistic and confirmed records) and the
//! server-assigned id. Both indexes are maintained on every mutation so
//! reconciliation and inbound status updates never scan the list.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use murmur_proto::message::{ClientId, Message};

/// Outcome of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    /// The message was new and is now in the list.
    Added,
    /// A record with the same server id or `client_id` already exists;
    /// the list is unchanged.
    Duplicate,
}

/// Ordered message collection, newest first.
#[derive(Debug, Default)]
pub struct MessageList {
    /// `client_id`s in display order, newest at the front.
    order: VecDeque<ClientId>,
    /// Message records keyed by `client_id`.
    by_client: HashMap<ClientId, Message>,
    /// Server id to `client_id`, for confirmed records only.
    by_server: HashMap<String, ClientId>,
}

impl MessageList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Inserts at the head (newest end), deduplicating by server id and
    /// `client_id`.
    pub fn insert_head(&mut self, message: Message) -> Insert {
        if self.is_known(&message) {
            return Insert::Duplicate;
        }
        self.index_server_id(&message);
        self.order.push_front(message.client_id.clone());
        self.by_client.insert(message.client_id.clone(), message);
        Insert::Added
    }

    /// Appends at the tail (oldest end), deduplicating by server id and
    /// `client_id`. Used by pagination.
    pub fn append_tail(&mut self, message: Message) -> Insert {
        if self.is_known(&message) {
            return Insert::Duplicate;
        }
        self.index_server_id(&message);
        self.order.push_back(message.client_id.clone());
        self.by_client.insert(message.client_id.clone(), message);
        Insert::Added
    }

    /// Replaces an optimistic record with the server-confirmed one, matched
    /// by `client_id`. The local `created_at` is preserved; everything else
    /// comes from the server record. Returns the stored record, or `None`
    /// if no record with that `client_id` exists.
    pub fn reconcile(&mut self, client_id: &ClientId, mut confirmed: Message) -> Option<&Message> {
        let existing = self.by_client.get_mut(client_id)?;
        confirmed.client_id = client_id.clone();
        confirmed.created_at = existing.created_at;
        if !existing.id.is_provisional() {
            self.by_server.remove(existing.id.as_str());
        }
        if !confirmed.id.is_provisional() {
            self.by_server
                .insert(confirmed.id.as_str().to_owned(), client_id.clone());
        }
        *existing = confirmed;
        self.by_client.get(client_id)
    }

    /// Looks up a record by `client_id`.
    #[must_use]
    pub fn get(&self, client_id: &ClientId) -> Option<&Message> {
        self.by_client.get(client_id)
    }

    /// Looks up a record by server-assigned id.
    #[must_use]
    pub fn get_by_server_id(&self, id: &str) -> Option<&Message> {
        self.by_client.get(self.by_server.get(id)?)
    }

    /// Mutates the record with the given `client_id` in place. Returns a
    /// clone of the updated record.
    pub fn update(
        &mut self,
        client_id: &ClientId,
        apply: impl FnOnce(&mut Message),
    ) -> Option<Message> {
        let message = self.by_client.get_mut(client_id)?;
        apply(message);
        Some(message.clone())
    }

    /// Mutates the record with the given server id in place. Returns a clone
    /// of the updated record.
    pub fn update_by_server_id(
        &mut self,
        id: &str,
        apply: impl FnOnce(&mut Message),
    ) -> Option<Message> {
        let client_id = self.by_server.get(id)?;
        let message = self.by_client.get_mut(client_id)?;
        apply(message);
        Some(message.clone())
    }

    /// Removes the record with the given server id.
    pub fn remove_by_server_id(&mut self, id: &str) -> Option<Message> {
        let client_id = self.by_server.remove(id)?;
        self.order.retain(|c| c != &client_id);
        self.by_client.remove(&client_id)
    }

    /// `created_at` of the newest record, used as the sync watermark.
    #[must_use]
    pub fn newest_created_at(&self) -> Option<DateTime<Utc>> {
        self.order
            .iter()
            .filter_map(|c| self.by_client.get(c))
            .map(|m| m.created_at)
            .max()
    }

    /// Snapshot of the list in display order, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.order
            .iter()
            .filter_map(|c| self.by_client.get(c))
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.by_client.clear();
        self.by_server.clear();
    }

    fn is_known(&self, message: &Message) -> bool {
        (!message.id.is_provisional() && self.by_server.contains_key(message.id.as_str()))
            || self.by_client.contains_key(&message.client_id)
    }

    fn index_server_id(&mut self, message: &Message) {
        if !message.id.is_provisional() {
            self.by_server
                .insert(message.id.as_str().to_owned(), message.client_id.clone());
        }
    }
}

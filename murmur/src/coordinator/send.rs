//! Outbound pipeline: optimistic insert, REST confirmation, queueing, and
//! the REST-backed message operations (delete, react, mark-read).
//!
//! REST is the durable confirmation path -- a message is `sent` only once
//! `POST /messages` returned the server record. The socket is used purely
//! to announce the already-confirmed message to the peer for realtime
//! delivery.

use chrono::Utc;
use tracing::{debug, info, warn};

use murmur_proto::frame::ClientFrame;
use murmur_proto::message::{Message, MessageStatus, MessageType, validate_content};

use crate::cipher::ContentCipher;
use crate::rest::{BackendApi, RestError};
use crate::store::{StateStore, collections};
use crate::transport::{ConnectionStatus, RealtimeLink};

use super::{ChatClient, ChatEvent, SendError};

/// Optional fields of an outgoing message.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Content kind; defaults to text.
    pub message_type: MessageType,
    /// Media location for non-text messages.
    pub media_url: Option<String>,
    /// Id of the message being replied to.
    pub reply_to_id: Option<String>,
    /// View-once ephemerality flag.
    pub is_view_once: bool,
    /// Self-destruct timer in seconds.
    pub self_destruct_timer: Option<u32>,
}

impl<C, R, S, L> ChatClient<C, R, S, L>
where
    C: ContentCipher + 'static,
    R: BackendApi + 'static,
    S: StateStore + 'static,
    L: RealtimeLink,
{
    /// Sends a message to `receiver_id`.
    ///
    /// The message appears in the active list immediately (optimistic
    /// record, provisional id). While connected it is confirmed via REST
    /// and announced over the socket; otherwise -- or when REST fails -- it
    /// lands in the durable outbound queue and retries on the next flush.
    /// Returns the record as currently stored.
    ///
    /// # Errors
    ///
    /// Only local failures error: empty/oversized content, or encryption
    /// failure. Network failure is absorbed into queue membership.
    pub async fn send_message(
        &self,
        receiver_id: &str,
        content: &str,
        options: SendOptions,
    ) -> Result<Message, SendError> {
        validate_content(content)?;
        let encrypted = self.cipher.encrypt(content)?;

        let connected = self.link.status() == ConnectionStatus::Connected;
        let mut message = Message::outgoing(
            self.config.user_id.clone(),
            receiver_id,
            options.message_type,
            encrypted.ciphertext,
            encrypted.iv,
            if connected {
                MessageStatus::Sending
            } else {
                MessageStatus::Queued
            },
        );
        message.media_url = options.media_url;
        message.reply_to_id = options.reply_to_id;
        message.is_view_once = options.is_view_once;
        message.self_destruct_timer = options.self_destruct_timer;

        self.state.lock().list.insert_head(message.clone());
        self.persist_message(&message).await;
        self.emit(ChatEvent::MessageListChanged);

        if connected {
            match self.confirm(&message).await {
                Ok(confirmed) => return Ok(confirmed),
                Err(err) => {
                    warn!(client_id = %message.client_id, %err, "send failed, queueing");
                }
            }
        }
        self.enqueue(message.clone()).await;
        let queued = self.state.lock().list.get(&message.client_id).cloned();
        Ok(queued.unwrap_or(message))
    }

    /// Fire-and-forget typing indicator; safe to call while disconnected
    /// (the frame is buffered by the link).
    pub fn send_typing(&self, receiver_id: &str, is_typing: bool) {
        self.link.send(ClientFrame::Typing {
            receiver_id: receiver_id.to_owned(),
            is_typing,
        });
    }

    /// Deletes a message.
    ///
    /// The local record is removed unconditionally -- REST failure is
    /// recorded in the observable error field but never resurrects the
    /// message.
    pub async fn delete_message(&self, id: &str, for_everyone: bool) {
        if let Err(err) = self.backend.delete_message(id, for_everyone).await {
            self.record_error("delete message", &err);
        }
        let removed = self.state.lock().list.remove_by_server_id(id);
        if let Some(removed) = removed {
            self.drop_cached(Self::cache_key(&removed)).await;
            self.emit(ChatEvent::MessageListChanged);
        }
    }

    /// Toggles a reaction, applying the server-returned reaction map.
    pub async fn react_to_message(&self, id: &str, emoji: &str) {
        match self.backend.react(id, emoji).await {
            Ok(reactions) => {
                let updated = self
                    .state
                    .lock()
                    .list
                    .update_by_server_id(id, |m| m.reactions = reactions);
                if let Some(message) = updated {
                    self.persist_message(&message).await;
                    self.emit(ChatEvent::MessageListChanged);
                }
            }
            Err(err) => self.record_error("react", &err),
        }
    }

    /// Marks an inbound message as read: REST first, then the local record,
    /// then a read-receipt frame so the sender sees `read` in realtime.
    pub async fn mark_message_read(&self, id: &str) {
        if let Err(err) = self.backend.mark_read(id).await {
            self.record_error("mark read", &err);
            return;
        }
        let read_at = Utc::now();
        let updated = self.state.lock().list.update_by_server_id(id, |m| {
            m.status = MessageStatus::Read;
            m.read_at = Some(read_at);
        });
        if let Some(message) = updated {
            self.persist_message(&message).await;
            self.emit(ChatEvent::StatusChanged {
                client_id: message.client_id.clone(),
                status: MessageStatus::Read,
            });
            self.link.send(ClientFrame::ReadReceipt {
                receiver_id: message.sender_id,
                message_ids: vec![id.to_owned()],
                read_at: Some(read_at),
            });
        }
    }

    /// Flushes the outbound queue, strictly sequentially over a snapshot.
    ///
    /// Each entry retries the same REST confirmation path as
    /// [`send_message`](Self::send_message); failures stay queued for the
    /// next trigger (reconnect or explicit sync). Guarded against
    /// concurrent flushes.
    pub async fn flush_queue(&self) {
        let snapshot = {
            let mut state = self.state.lock();
            if state.flushing || state.outbox.is_empty() {
                return;
            }
            state.flushing = true;
            state.outbox.clone()
        };

        for message in snapshot {
            match self.confirm(&message).await {
                Ok(confirmed) => {
                    self.state
                        .lock()
                        .outbox
                        .retain(|m| m.client_id != message.client_id);
                    if let Err(err) = self
                        .store
                        .delete(collections::OUTBOX, message.client_id.as_str())
                        .await
                    {
                        self.record_error("dequeue message", &err);
                    }
                    info!(
                        client_id = %message.client_id,
                        id = %confirmed.id,
                        "queued message confirmed"
                    );
                }
                Err(err) => {
                    debug!(client_id = %message.client_id, %err, "queued send failed, will retry");
                }
            }
        }

        self.state.lock().flushing = false;
    }

    /// Confirms a message via REST and reconciles the optimistic record:
    /// server record replaces it (matched by `client_id`, preserving
    /// `created_at`), the cache is re-keyed to the server id, and the peer
    /// is notified over the socket.
    pub(crate) async fn confirm(&self, draft: &Message) -> Result<Message, RestError> {
        let server = self.backend.send_message(draft).await?;

        let stored = self
            .state
            .lock()
            .list
            .reconcile(&draft.client_id, server.clone())
            .cloned();
        // A record deleted mid-flight is gone from the list; the server
        // answer is still used for announce and cache cleanup.
        let record = stored.unwrap_or(server);

        self.drop_cached(draft.client_id.as_str()).await;
        self.persist_message(&record).await;
        self.emit(ChatEvent::StatusChanged {
            client_id: record.client_id.clone(),
            status: record.status,
        });

        self.link.send(ClientFrame::Message {
            message_id: record.id.as_str().to_owned(),
            client_id: record.client_id.clone(),
            receiver_id: record.receiver_id.clone(),
            delivered_at: Some(record.delivered_at.unwrap_or_else(Utc::now)),
            message: Some(record.clone()),
        });

        Ok(record)
    }

    /// Parks a message in the durable outbound queue (keyed upsert by
    /// `client_id`) and marks the visible record `queued`.
    async fn enqueue(&self, mut message: Message) {
        message.status = MessageStatus::Queued;
        {
            let mut state = self.state.lock();
            let _ = state
                .list
                .update(&message.client_id, |m| m.status = MessageStatus::Queued);
            if let Some(existing) = state
                .outbox
                .iter_mut()
                .find(|m| m.client_id == message.client_id)
            {
                *existing = message.clone();
            } else {
                state.outbox.push(message.clone());
            }
        }
        self.persist_message(&message).await;
        match serde_json::to_value(&message) {
            Ok(value) => {
                if let Err(err) = self
                    .store
                    .put(collections::OUTBOX, message.client_id.as_str(), value)
                    .await
                {
                    self.record_error("persist queue entry", &err);
                }
            }
            Err(err) => self.record_error("encode queue entry", &err),
        }
        self.emit(ChatEvent::StatusChanged {
            client_id: message.client_id.clone(),
            status: MessageStatus::Queued,
        });
    }
}

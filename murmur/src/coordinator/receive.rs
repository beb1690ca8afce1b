//! Inbound frame dispatch, sync, and pagination.
//!
//! Everything here is driven by the realtime link's frame stream or by the
//! UI scrolling back in history. Duplicate deliveries are suppressed by the
//! list's server-id index; all status updates are last-write-wins per field
//! so a slow REST confirmation finishing after a `messages_read` push never
//! downgrades a record wholesale.

use chrono::Utc;
use tracing::debug;

use murmur_proto::frame::{ClientFrame, ServerFrame};
use murmur_proto::message::{Message, MessageStatus};

use crate::cipher::ContentCipher;
use crate::rest::BackendApi;
use crate::store::StateStore;
use crate::transport::{ConnectionStatus, RealtimeLink};

use super::list::Insert;
use super::{ChatClient, ChatEvent};

impl<C, R, S, L> ChatClient<C, R, S, L>
where
    C: ContentCipher + 'static,
    R: BackendApi + 'static,
    S: StateStore + 'static,
    L: RealtimeLink,
{
    /// Dispatches one inbound frame.
    pub(crate) async fn handle_frame(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::NewMessage {
                message: Some(message),
                ..
            } => {
                self.accept_incoming(message).await;
            }
            ServerFrame::NewMessage {
                message: None,
                message_id,
                ..
            } => {
                // Lightweight announcement: the body travels via REST.
                debug!(?message_id, "message announce without body, fetching latest");
                match self.backend.fetch_messages(1, 0, None).await {
                    Ok(page) => {
                        if let Some(message) = page.into_iter().next() {
                            self.accept_incoming(message).await;
                        }
                    }
                    Err(err) => debug!(%err, "fetch after announce failed"),
                }
            }
            ServerFrame::MessageDelivered {
                message_id,
                delivered_at,
            } => {
                let at = delivered_at.unwrap_or_else(Utc::now);
                let updated = self.state.lock().list.update_by_server_id(&message_id, |m| {
                    // `read` already implies delivered; never step back.
                    if m.status != MessageStatus::Read {
                        m.status = MessageStatus::Delivered;
                    }
                    m.delivered_at = Some(at);
                });
                if let Some(message) = updated {
                    self.persist_message(&message).await;
                    self.emit(ChatEvent::StatusChanged {
                        client_id: message.client_id,
                        status: message.status,
                    });
                }
            }
            ServerFrame::MessagesRead {
                message_ids,
                read_at,
            } => {
                let at = read_at.unwrap_or_else(Utc::now);
                for id in message_ids {
                    let updated = self.state.lock().list.update_by_server_id(&id, |m| {
                        m.status = MessageStatus::Read;
                        m.read_at = Some(at);
                    });
                    if let Some(message) = updated {
                        self.persist_message(&message).await;
                        self.emit(ChatEvent::StatusChanged {
                            client_id: message.client_id,
                            status: MessageStatus::Read,
                        });
                    }
                }
            }
            ServerFrame::Typing {
                sender_id,
                is_typing,
            } => {
                self.state
                    .lock()
                    .typing
                    .insert(sender_id.clone(), is_typing);
                self.emit(ChatEvent::TypingChanged {
                    sender_id,
                    is_typing,
                });
            }
            ServerFrame::Pong | ServerFrame::Unknown => {
                debug!("ignoring frame");
            }
        }
    }

    /// Fetches messages newer than the local watermark, merges them, then
    /// flushes the outbound queue. No-op while the link is down -- the next
    /// `connected` transition re-triggers it.
    pub async fn sync_messages(&self) {
        if self.link.status() != ConnectionStatus::Connected {
            return;
        }
        let watermark = self.state.lock().list.newest_created_at();
        match self
            .backend
            .fetch_messages(self.config.page_size, 0, watermark)
            .await
        {
            Ok(page) => {
                let mut changed = false;
                // The page is newest-first; walk it oldest-first so the
                // head ends up newest.
                for message in page.into_iter().rev() {
                    if self.state.lock().list.insert_head(message.clone()) == Insert::Added {
                        self.persist_message(&message).await;
                        changed = true;
                    }
                }
                if changed {
                    self.emit(ChatEvent::MessageListChanged);
                }
            }
            Err(err) => debug!(%err, "sync fetch failed"),
        }
        self.flush_queue().await;
    }

    /// Loads the next page of history onto the tail of the list.
    ///
    /// Guarded by an in-flight flag; once a page comes back short of the
    /// page size, `has_more` latches false and further calls are no-ops.
    pub async fn fetch_more_messages(&self) {
        let offset = {
            let mut state = self.state.lock();
            if state.fetching || !state.has_more {
                return;
            }
            state.fetching = true;
            state.list.len()
        };

        match self
            .backend
            .fetch_messages(self.config.page_size, offset, None)
            .await
        {
            Ok(page) => {
                let short = page.len() < self.config.page_size;
                for message in page {
                    if self.state.lock().list.append_tail(message.clone()) == Insert::Added {
                        self.persist_message(&message).await;
                    }
                }
                {
                    let mut state = self.state.lock();
                    if short {
                        state.has_more = false;
                    }
                    state.fetching = false;
                }
                self.emit(ChatEvent::MessageListChanged);
            }
            Err(err) => {
                self.record_error("fetch more messages", &err);
                self.state.lock().fetching = false;
            }
        }
    }

    /// Accepts an inbound message: insert-if-absent at head, persist, and
    /// acknowledge with a read receipt when we are the receiver.
    async fn accept_incoming(&self, message: Message) {
        if self.state.lock().list.insert_head(message.clone()) == Insert::Duplicate {
            debug!(id = %message.id, "duplicate delivery ignored");
            return;
        }
        self.persist_message(&message).await;
        self.emit(ChatEvent::MessageListChanged);
        self.emit(ChatEvent::MessageReceived {
            message: message.clone(),
        });

        if message.receiver_id == self.config.user_id && !message.id.is_provisional() {
            self.link.send(ClientFrame::ReadReceipt {
                receiver_id: message.sender_id,
                message_ids: vec![message.id.as_str().to_owned()],
                read_at: Some(Utc::now()),
            });
        }
    }
}

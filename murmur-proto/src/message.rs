//! The chat message data model.
//!
//! Field names mirror the backend's JSON schema (snake_case), so the same
//! struct serves as the REST request/response body, the socket frame payload,
//! and the persisted cache record. Content is always carried encrypted --
//! `encrypted_content` plus `encryption_iv`, both base64.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum plaintext content size in bytes, checked before encryption (64 KB).
pub const MAX_CONTENT_BYTES: usize = 64 * 1024;

/// Client-generated idempotency key, stable across retries of the same
/// logical message.
///
/// This is the sole correlation key between an optimistic local record and
/// the server-confirmed record. It never changes for the lifetime of a
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generates a fresh time-ordered id (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server-assigned message id.
///
/// Empty until the backend has confirmed the message; reconciliation replaces
/// the provisional value exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Wraps an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// An empty id standing in until the server assigns one.
    #[must_use]
    pub const fn provisional() -> Self {
        Self(String::new())
    }

    /// Returns `true` while the server has not yet assigned an id.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the string form of this id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of content a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text (encrypted before transport).
    Text,
    /// An image referenced by `media_url`.
    Image,
    /// A video referenced by `media_url`.
    Video,
    /// An audio clip referenced by `media_url`.
    Audio,
    /// A generic file attachment.
    File,
    /// A recorded voice note.
    Voice,
}

impl Default for MessageType {
    fn default() -> Self {
        Self::Text
    }
}

/// Delivery lifecycle of a message.
///
/// `Queued` and `Sending` are client-local optimistic states; `Sent`,
/// `Delivered` and `Read` are server-confirmed. `Failed` exists for wire
/// compatibility but is never assigned by this client -- unsendable messages
/// stay `Queued` and retry on the next flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created while offline, waiting in the outbox.
    Queued,
    /// Created while online, REST confirmation in flight.
    Sending,
    /// Confirmed by the backend, server id assigned.
    Sent,
    /// The receiver's device acknowledged delivery.
    Delivered,
    /// The receiver read the message.
    Read,
    /// Permanent failure (wire compatibility only).
    Failed,
}

impl MessageStatus {
    /// Returns `true` once the backend has confirmed the message.
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        matches!(self, Self::Sent | Self::Delivered | Self::Read)
    }
}

/// Map of emoji to the set of user ids that reacted with it.
pub type Reactions = HashMap<String, BTreeSet<String>>;

/// A single chat communication unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id; provisional (empty) until confirmed.
    #[serde(default)]
    pub id: MessageId,
    /// Client-generated idempotency key.
    pub client_id: ClientId,
    /// Sending user id.
    pub sender_id: String,
    /// Receiving user id.
    pub receiver_id: String,
    /// Kind of content.
    #[serde(default)]
    pub message_type: MessageType,
    /// Base64 ciphertext of the content.
    pub encrypted_content: String,
    /// Base64 nonce used for `encrypted_content`.
    pub encryption_iv: String,
    /// Media location for non-text messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    /// Thumbnail location for media messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_thumbnail_url: Option<String>,
    /// Opaque media metadata (dimensions, duration, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_metadata: Option<serde_json::Value>,
    /// Id of the message this one replies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    /// Emoji reactions keyed by emoji.
    #[serde(default)]
    pub reactions: Reactions,
    /// View-once ephemerality flag.
    #[serde(default)]
    pub is_view_once: bool,
    /// Self-destruct timer in seconds, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_destruct_timer: Option<u32>,
    /// Current delivery state.
    pub status: MessageStatus,
    /// Client-set creation time; authoritative for ordering until
    /// reconciliation, and never overwritten by it.
    pub created_at: DateTime<Utc>,
    /// When delivery was confirmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    /// When the receiver read the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    /// Soft-deleted on the sender's side.
    #[serde(default)]
    pub deleted_by_sender: bool,
    /// Soft-deleted on the receiver's side.
    #[serde(default)]
    pub deleted_by_receiver: bool,
    /// Tombstone: content must be treated as absent by all clients.
    #[serde(default)]
    pub deleted_for_everyone: bool,
}

impl Message {
    /// Builds a fresh outgoing message with a provisional id and a newly
    /// generated [`ClientId`].
    #[must_use]
    pub fn outgoing(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        message_type: MessageType,
        encrypted_content: String,
        encryption_iv: String,
        status: MessageStatus,
    ) -> Self {
        Self {
            id: MessageId::provisional(),
            client_id: ClientId::generate(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            message_type,
            encrypted_content,
            encryption_iv,
            media_url: None,
            media_thumbnail_url: None,
            media_metadata: None,
            reply_to_id: None,
            reactions: Reactions::new(),
            is_view_once: false,
            self_destruct_timer: None,
            status,
            created_at: Utc::now(),
            delivered_at: None,
            read_at: None,
            deleted_by_sender: false,
            deleted_by_receiver: false,
            deleted_for_everyone: false,
        }
    }

    /// Returns `true` if the content must be treated as absent everywhere.
    #[must_use]
    pub const fn is_tombstoned(&self) -> bool {
        self.deleted_for_everyone
    }
}

/// Error returned when plaintext content fails pre-encryption validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Content is empty.
    #[error("message content is empty")]
    Empty,
    /// Content exceeds the maximum allowed size.
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the content in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates plaintext content before it is encrypted and sent.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] for empty content, or
/// [`ValidationError::TooLarge`] past [`MAX_CONTENT_BYTES`].
pub const fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.is_empty() {
        return Err(ValidationError::Empty);
    }
    let size = content.len();
    if size > MAX_CONTENT_BYTES {
        return Err(ValidationError::TooLarge {
            size,
            max: MAX_CONTENT_BYTES,
        });
    }
    Ok(())
}

//! JSON socket frames for the realtime connection.
//!
//! Every frame is a JSON text message internally tagged with `"type"`.
//! [`ClientFrame`] is what the client produces; [`ServerFrame`] is what it
//! consumes. The two sets are asymmetric on purpose: the server turns a
//! `message` announcement into a `new_message` push and a `read_receipt`
//! into a `messages_read` push for the other party.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{ClientId, Message};

/// Frames sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Liveness probe; the server answers with [`ServerFrame::Pong`].
    Ping,
    /// Announce a REST-confirmed message to the peer for realtime delivery.
    Message {
        /// Server-assigned id of the confirmed message.
        message_id: String,
        /// The sender's idempotency key.
        client_id: ClientId,
        /// Who should be notified.
        receiver_id: String,
        /// When the announcement was produced.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delivered_at: Option<DateTime<Utc>>,
        /// Full message body so the peer can render without a REST fetch.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
    },
    /// Keystroke status for the peer's conversation view.
    Typing {
        /// Who should see the indicator.
        receiver_id: String,
        /// Whether the local user is currently typing.
        is_typing: bool,
    },
    /// Tell the sender of the listed messages that they were read.
    ReadReceipt {
        /// The original sender, who receives the `messages_read` push.
        receiver_id: String,
        /// Server ids of the messages that were read.
        message_ids: Vec<String>,
        /// When they were read.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        read_at: Option<DateTime<Utc>>,
    },
}

/// Frames pushed from the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Liveness acknowledgment for a [`ClientFrame::Ping`].
    Pong,
    /// A message addressed to this user arrived.
    ///
    /// `message` is present when the server embeds the full body; otherwise
    /// this is a lightweight notification and the client falls back to a
    /// REST fetch.
    NewMessage {
        /// Full message body, if embedded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Message>,
        /// Server id of the message, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        /// Sender's idempotency key, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<ClientId>,
        /// Sending user id.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        /// Delivery timestamp carried by the announcement.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delivered_at: Option<DateTime<Utc>>,
    },
    /// A message this client sent reached the receiver's device.
    MessageDelivered {
        /// Server id of the delivered message.
        message_id: String,
        /// When it was delivered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delivered_at: Option<DateTime<Utc>>,
    },
    /// Messages this client sent were read by the receiver.
    MessagesRead {
        /// Server ids of the read messages.
        message_ids: Vec<String>,
        /// When they were read.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        read_at: Option<DateTime<Utc>>,
    },
    /// The peer started or stopped typing.
    Typing {
        /// Who is typing.
        sender_id: String,
        /// Whether they are currently typing.
        is_typing: bool,
    },
    /// Any frame kind this client version does not understand.
    ///
    /// Unknown kinds are tolerated rather than rejected so older clients
    /// survive protocol additions.
    #[serde(other)]
    Unknown,
}

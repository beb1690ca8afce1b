//! WebSocket endpoint: per-user socket lifecycle and frame routing.
//!
//! A client connects to `/ws/chat?token=<user_id>` (the dev token IS the
//! user id). The connection lifecycle:
//! 1. Authenticate from the `token` query parameter before upgrading.
//! 2. Register the user's writer channel, replacing any prior socket.
//! 3. Route text frames: `ping` answers `pong`, `message` announcements
//!    fan out `new_message` pushes, `typing` and `read_receipt` forward
//!    to the other party.
//! 4. On disconnect, unregister the user.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use murmur_proto::codec;
use murmur_proto::frame::{ClientFrame, ServerFrame};

use crate::state::HubState;

/// Upgrades `/ws/chat` after validating the `token` query parameter.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<HubState>>,
) -> Response {
    let Some(user_id) = params.get("token").filter(|t| !t.is_empty()).cloned() else {
        return (StatusCode::UNAUTHORIZED, "missing token").into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
        .into_response()
}

/// Handles an upgraded WebSocket connection for a single user.
async fn handle_socket(socket: WebSocket, state: Arc<HubState>, user_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel feeding this user's writer task.
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    if state.register(&user_id, tx.clone()).is_some() {
        tracing::info!(%user_id, "replaced existing connection");
    }
    tracing::info!(%user_id, "user connected");

    // Writer task: forwards channel messages to the WebSocket.
    let writer_user = user_id.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(user_id = %writer_user, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader task: decode and route frames from this user.
    let reader_user = user_id.clone();
    let reader_state = Arc::clone(&state);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                WsMessage::Text(text) => {
                    handle_text_frame(&reader_user, text.as_str(), &reader_state, &tx);
                }
                WsMessage::Close(_) => {
                    tracing::info!(user_id = %reader_user, "received close frame");
                    break;
                }
                _ => {
                    // Ignore binary, ping, pong frames.
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    state.unregister(&user_id);
    tracing::info!(%user_id, "user disconnected and unregistered");
}

/// Decodes and dispatches a single text frame from `user_id`.
fn handle_text_frame(
    user_id: &str,
    text: &str,
    state: &Arc<HubState>,
    self_tx: &mpsc::UnboundedSender<WsMessage>,
) {
    let frame = match codec::decode_client(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(%user_id, error = %e, "failed to decode frame");
            return;
        }
    };

    match frame {
        ClientFrame::Ping => {
            send_frame_on(self_tx, &ServerFrame::Pong);
        }
        ClientFrame::Message {
            message_id,
            client_id,
            receiver_id,
            delivered_at,
            message,
        } => {
            let delivered_at = delivered_at.unwrap_or_else(Utc::now);
            state.mark_delivered(&message_id, delivered_at);

            // Prefer the stored (authoritative) record over the announced
            // body when embedding into the push.
            let body = state.get(&message_id).or(message);
            let receiver_online = if let Some(sender) = state.sender_for(&receiver_id) {
                send_frame_on(
                    &sender,
                    &ServerFrame::NewMessage {
                        message: body,
                        message_id: Some(message_id.clone()),
                        client_id: Some(client_id),
                        from: Some(user_id.to_owned()),
                        delivered_at: Some(delivered_at),
                    },
                );
                true
            } else {
                false
            };

            // Delivery confirmation back to the announcing sender.
            if receiver_online {
                send_frame_on(
                    self_tx,
                    &ServerFrame::MessageDelivered {
                        message_id,
                        delivered_at: Some(delivered_at),
                    },
                );
            }
        }
        ClientFrame::Typing {
            receiver_id,
            is_typing,
        } => {
            if let Some(sender) = state.sender_for(&receiver_id) {
                send_frame_on(
                    &sender,
                    &ServerFrame::Typing {
                        sender_id: user_id.to_owned(),
                        is_typing,
                    },
                );
            }
        }
        ClientFrame::ReadReceipt {
            receiver_id,
            message_ids,
            read_at,
        } => {
            let read_at = read_at.unwrap_or_else(Utc::now);
            for id in &message_ids {
                let _ = state.mark_read(id, read_at);
            }
            if let Some(sender) = state.sender_for(&receiver_id) {
                send_frame_on(
                    &sender,
                    &ServerFrame::MessagesRead {
                        message_ids,
                        read_at: Some(read_at),
                    },
                );
            }
        }
    }
}

/// Encodes a server frame and pushes it onto a user's writer channel.
pub(crate) fn send_frame_on(sender: &mpsc::UnboundedSender<WsMessage>, frame: &ServerFrame) {
    match codec::encode_server(frame) {
        Ok(text) => {
            let _ = sender.send(WsMessage::Text(text.into()));
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to encode frame");
        }
    }
}

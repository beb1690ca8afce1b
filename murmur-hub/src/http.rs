//! HTTP surface: the axum router, REST message handlers, and server startup.
//!
//! REST is the durable path: `POST /messages` confirms a send and assigns
//! the server id; the socket only announces already-confirmed messages.
//! Auth is the dev scheme throughout: the bearer token IS the user id.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use murmur_proto::frame::ServerFrame;
use murmur_proto::message::Message;

use crate::state::HubState;
use crate::ws;

/// Extracts the user id from a `Bearer` authorization header.
fn authenticate(headers: &HeaderMap) -> Result<String, StatusCode> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .ok_or(StatusCode::UNAUTHORIZED)
}

/// `POST /messages` body is the client's draft [`Message`]; the response is
/// the stored record with the assigned server id.
async fn post_message(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Json(mut draft): Json<Message>,
) -> Result<Response, StatusCode> {
    let user_id = authenticate(&headers)?;
    // The content size limit applies to plaintext on the client side; here
    // the body carries ciphertext, so only presence is checked.
    if draft.receiver_id.is_empty()
        || draft.encrypted_content.is_empty()
        || draft.encryption_iv.is_empty()
    {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    // The caller's identity wins over whatever the draft claims.
    draft.sender_id = user_id;

    let duplicate = state.knows_client_id(&draft.client_id);
    let stored = state.insert_message(draft);
    let status = if duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(stored)).into_response())
}

/// Query parameters for `GET /messages`.
#[derive(Debug, Deserialize)]
struct MessagesQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
    last_sync: Option<String>,
}

const fn default_limit() -> usize {
    50
}

async fn get_messages(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    let user_id = authenticate(&headers)?;
    let last_sync = match query.last_sync.as_deref() {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?,
        ),
        None => None,
    };
    Ok(Json(state.page_for(
        &user_id,
        query.limit,
        query.offset,
        last_sync,
    )))
}

/// Query parameters for `DELETE /messages/{id}`.
#[derive(Debug, Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    delete_for_everyone: bool,
}

async fn delete_message(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, StatusCode> {
    let user_id = authenticate(&headers)?;
    if state.delete(&id, &user_id, query.delete_for_everyone) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// Body of `POST /messages/{id}/react`.
#[derive(Debug, Deserialize)]
struct ReactBody {
    emoji: String,
}

async fn react_to_message(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReactBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let user_id = authenticate(&headers)?;
    let reactions = state
        .toggle_reaction(&id, &user_id, &body.emoji)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(serde_json::json!({ "reactions": reactions })))
}

async fn mark_message_read(
    State(state): State<Arc<HubState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let _user_id = authenticate(&headers)?;
    let read_at = Utc::now();
    let sender_id = state.mark_read(&id, read_at).ok_or(StatusCode::NOT_FOUND)?;
    // Tell the original sender in realtime when they are online.
    if let Some(sender) = state.sender_for(&sender_id) {
        ws::send_frame_on(
            &sender,
            &ServerFrame::MessagesRead {
                message_ids: vec![id],
                read_at: Some(read_at),
            },
        );
    }
    Ok(StatusCode::OK)
}

/// Builds the hub router over shared [`HubState`].
pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/messages", post(post_message).get(get_messages))
        .route(
            "/messages/{id}",
            axum::routing::delete(delete_message),
        )
        .route("/messages/{id}/react", post(react_to_message))
        .route("/messages/{id}/mark-read", post(mark_message_read))
        .route("/ws/chat", get(ws::ws_handler))
        .with_state(state)
}

/// Starts the hub on the given address and returns the bound address and a
/// join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(HubState::new())).await
}

/// Starts the hub with a pre-configured [`HubState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<HubState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "hub server error");
        }
    });

    Ok((bound_addr, handle))
}

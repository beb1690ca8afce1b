//! Murmur hub -- in-memory chat backend for development and testing.
//!
//! Implements the REST contract the client's delivery coordinator consumes
//! (idempotent send, paginated fetch with a sync watermark, soft delete,
//! reactions, mark-read) plus the `/ws/chat` realtime endpoint (liveness
//! ping/pong, message announcements fanned out as `new_message`, typing and
//! read-receipt forwarding).
//!
//! Authentication is the development scheme: the bearer token *is* the user
//! id, both for REST and for the socket's `?token=` query parameter. The
//! hub never decrypts anything -- message content passes through as opaque
//! ciphertext.

pub mod config;
pub mod http;
pub mod state;
pub mod ws;

pub use http::start_server;

//! Shared wire-format definitions for Murmur.
//!
//! Contains the [`message::Message`] data model exchanged with the backend
//! REST API and the JSON socket frames ([`frame::ClientFrame`] /
//! [`frame::ServerFrame`]) exchanged over the realtime connection.

pub mod codec;
pub mod frame;
pub mod message;

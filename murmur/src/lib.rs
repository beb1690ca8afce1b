//! Murmur -- resilient realtime chat client core.
//!
//! The crate is organised around four components, leaves first:
//!
//! - [`cipher`] -- per-install symmetric encryption of message content.
//! - [`store`] -- keyed-collection adapter over an embedded object store.
//! - [`transport`] -- the reconnecting socket client with heartbeat and
//!   liveness watchdog.
//! - [`coordinator`] -- the delivery coordinator owning the message list,
//!   the outbox, and reconciliation of optimistic sends.
//!
//! [`rest`] holds the backend REST collaborator and [`config`] the layered
//! client configuration used by the headless binary.

pub mod cipher;
pub mod config;
pub mod coordinator;
pub mod rest;
pub mod store;
pub mod token;
pub mod transport;

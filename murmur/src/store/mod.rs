//! Persistent-store adapter.
//!
//! The core treats storage as an opaque keyed JSON-object store with named
//! collections; the actual embedded engine lives behind [`StateStore`].
//! Collection semantics are keyed upsert (last write wins per key) with
//! insertion order preserved -- the outbox relies on both: repeated queueing
//! of the same `client_id` replaces in place, and flushes walk the
//! collection oldest-first.

pub mod memory;

/// Named collections used by the core.
pub mod collections {
    /// Cached messages, keyed by server message id (or client id while
    /// provisional).
    pub const MESSAGES: &str = "messages";
    /// Outbound queue, keyed by `client_id`.
    pub const OUTBOX: &str = "outbox";
    /// Current user profile, single fixed key.
    pub const PROFILE: &str = "profile";
    /// UI settings, opaque to the core.
    pub const SETTINGS: &str = "settings";
}

/// Fixed key for the single profile record in [`collections::PROFILE`].
pub const PROFILE_KEY: &str = "current_user";

/// Errors surfaced by storage operations.
///
/// The coordinator never propagates these past its boundary; they are logged
/// and recorded in its observable error field while in-memory state carries
/// on best-effort.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying engine is unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write operation failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read operation failed.
    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// Keyed JSON-object store with named collections.
///
/// Implementations include [`memory::MemoryStore`] for tests and headless
/// runs; a disk-backed engine plugs in behind the same trait. Collections
/// are opened on demand and may be touched concurrently by independent
/// operations -- correctness relies on per-key upsert semantics, not locking.
pub trait StateStore: Send + Sync {
    /// Inserts or replaces `value` under `key` in `collection`.
    ///
    /// An existing key keeps its original position in the collection's
    /// insertion order.
    fn put(
        &self,
        collection: &str,
        key: &str,
        value: serde_json::Value,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Fetches the value under `key`, if present.
    fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<serde_json::Value>, StoreError>> + Send;

    /// Removes the value under `key`. Removing a missing key is not an error.
    fn delete(
        &self,
        collection: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Removes every record in `collection`.
    fn clear(
        &self,
        collection: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Returns all values in `collection` in insertion order.
    fn values(
        &self,
        collection: &str,
    ) -> impl std::future::Future<Output = Result<Vec<serde_json::Value>, StoreError>> + Send;
}

impl<T: StateStore> StateStore for std::sync::Arc<T> {
    async fn put(
        &self,
        collection: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        (**self).put(collection, key, value).await
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        (**self).get(collection, key).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        (**self).delete(collection, key).await
    }

    async fn clear(&self, collection: &str) -> Result<(), StoreError> {
        (**self).clear(collection).await
    }

    async fn values(&self, collection: &str) -> Result<Vec<serde_json::Value>, StoreError> {
        (**self).values(collection).await
    }
}

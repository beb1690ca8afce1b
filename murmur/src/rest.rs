//! Backend REST collaborator.
//!
//! The REST API is the durable confirmation path for sends: a message only
//! becomes `sent` once `POST /messages` has returned the server record. The
//! socket merely announces already-confirmed messages for realtime delivery.
//!
//! [`BackendApi`] is the seam the coordinator is generic over; [`HttpBackend`]
//! is the reqwest implementation with fixed connect/request timeouts set once
//! at construction.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use murmur_proto::message::{Message, Reactions};

use crate::token::TokenProvider;

/// Connect timeout for the HTTP client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Overall request timeout for the HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size used by the coordinator for pagination and sync.
pub const PAGE_SIZE: usize = 50;

/// Errors from the REST collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// No bearer credential was available.
    #[error("no access token available")]
    NoCredential,

    /// The request could not be built or transported.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned status {0}")]
    Status(u16),

    /// The configured base URL is invalid.
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
}

/// The backend message API consumed by the coordinator.
pub trait BackendApi: Send + Sync {
    /// `POST /messages` -- idempotent by `client_id`; returns the server
    /// record with the assigned id.
    fn send_message(
        &self,
        draft: &Message,
    ) -> impl std::future::Future<Output = Result<Message, RestError>> + Send;

    /// `GET /messages?limit&offset[&last_sync]` -- newest first.
    fn fetch_messages(
        &self,
        limit: usize,
        offset: usize,
        last_sync: Option<DateTime<Utc>>,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RestError>> + Send;

    /// `DELETE /messages/{id}?delete_for_everyone=`.
    fn delete_message(
        &self,
        id: &str,
        for_everyone: bool,
    ) -> impl std::future::Future<Output = Result<(), RestError>> + Send;

    /// `POST /messages/{id}/react` -- toggles the caller's reaction and
    /// returns the updated reaction map.
    fn react(
        &self,
        id: &str,
        emoji: &str,
    ) -> impl std::future::Future<Output = Result<Reactions, RestError>> + Send;

    /// `POST /messages/{id}/mark-read`.
    fn mark_read(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), RestError>> + Send;
}

impl<T: BackendApi> BackendApi for Arc<T> {
    async fn send_message(&self, draft: &Message) -> Result<Message, RestError> {
        (**self).send_message(draft).await
    }

    async fn fetch_messages(
        &self,
        limit: usize,
        offset: usize,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, RestError> {
        (**self).fetch_messages(limit, offset, last_sync).await
    }

    async fn delete_message(&self, id: &str, for_everyone: bool) -> Result<(), RestError> {
        (**self).delete_message(id, for_everyone).await
    }

    async fn react(&self, id: &str, emoji: &str) -> Result<Reactions, RestError> {
        (**self).react(id, emoji).await
    }

    async fn mark_read(&self, id: &str) -> Result<(), RestError> {
        (**self).mark_read(id).await
    }
}

/// Response body of the react endpoint.
#[derive(Debug, Deserialize)]
struct ReactResponse {
    #[serde(default)]
    reactions: Reactions,
}

/// reqwest-backed [`BackendApi`].
pub struct HttpBackend<P: TokenProvider> {
    http: reqwest::Client,
    base: Url,
    tokens: Arc<P>,
}

impl<P: TokenProvider> HttpBackend<P> {
    /// Builds a backend client for `base` (e.g. `http://localhost:8080/`).
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Request`] if the HTTP client cannot be built.
    pub fn new(base: Url, tokens: Arc<P>) -> Result<Self, RestError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base, tokens })
    }

    async fn bearer(&self) -> Result<String, RestError> {
        self.tokens
            .access_token()
            .await
            .ok_or(RestError::NoCredential)
    }

    fn endpoint(&self, path: &str) -> Result<Url, RestError> {
        Ok(self.base.join(path)?)
    }
}

impl<P: TokenProvider> BackendApi for HttpBackend<P> {
    async fn send_message(&self, draft: &Message) -> Result<Message, RestError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(self.endpoint("messages")?)
            .bearer_auth(token)
            .json(draft)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RestError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn fetch_messages(
        &self,
        limit: usize,
        offset: usize,
        last_sync: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, RestError> {
        let token = self.bearer().await?;
        let mut request = self
            .http
            .get(self.endpoint("messages")?)
            .bearer_auth(token)
            .query(&[("limit", limit), ("offset", offset)]);
        if let Some(watermark) = last_sync {
            request = request.query(&[("last_sync", watermark.to_rfc3339())]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RestError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    async fn delete_message(&self, id: &str, for_everyone: bool) -> Result<(), RestError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .delete(self.endpoint(&format!("messages/{id}"))?)
            .bearer_auth(token)
            .query(&[("delete_for_everyone", for_everyone)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RestError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn react(&self, id: &str, emoji: &str) -> Result<Reactions, RestError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(self.endpoint(&format!("messages/{id}/react"))?)
            .bearer_auth(token)
            .json(&serde_json::json!({ "message_id": id, "emoji": emoji }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RestError::Status(response.status().as_u16()));
        }
        let body: ReactResponse = response.json().await?;
        Ok(body.reactions)
    }

    async fn mark_read(&self, id: &str) -> Result<(), RestError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(self.endpoint(&format!("messages/{id}/mark-read"))?)
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RestError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

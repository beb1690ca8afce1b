//! Bearer credential supply.
//!
//! Both the socket client and the REST collaborator fetch the credential
//! fresh on every use -- never cached internally -- so a token refreshed
//! elsewhere (e.g. by the auth layer) is always picked up.

/// Supplies the current bearer credential, if one is available.
pub trait TokenProvider: Send + Sync + 'static {
    /// Returns the current access token, or `None` when signed out or the
    /// refresh has not completed yet.
    fn access_token(&self) -> impl std::future::Future<Output = Option<String>> + Send;
}

/// A fixed token, for tests and the headless client.
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a fixed credential string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

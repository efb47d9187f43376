//! Transport abstraction used by the site client.
//!
//! The orchestrator never talks to reqwest directly; it goes through
//! [`SiteTransport`] so tests can script responses and hosts can swap the
//! HTTP stack.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::HeaderMap;
use thiserror::Error;
use url::Url;

/// Contract that abstracts the underlying HTTP transport.
///
/// Implementations should ensure that cookies are preserved between calls so
/// the session behaves like a single browser.
#[async_trait]
pub trait SiteTransport: Send + Sync {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<SiteResponse, TransportError>;

    async fn post_form(
        &self,
        url: &Url,
        headers: &HeaderMap,
        form: &[(String, String)],
    ) -> Result<SiteResponse, TransportError>;
}

/// Minimal response representation returned by the transport abstraction.
#[derive(Debug, Clone)]
pub struct SiteResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Url,
}

impl SiteResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http transport error: {0}")]
    Transport(String),
    #[error("failed to build http client: {0}")]
    Build(String),
}

//! Reqwest-based implementation of the `SiteTransport` trait.
//!
//! Provides a thin adapter around `reqwest::Client` that installs the shared
//! cookie store, browser-like default headers, timeouts and the relaxed TLS
//! policy the site requires.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, redirect::Policy};
use url::Url;

use super::{SiteResponse, SiteTransport, TransportError};
use crate::config::RemoverConfig;
use crate::modules::cookies::CookieJar;

const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Reqwest-backed HTTP transport bound to one cookie store.
#[derive(Debug, Clone)]
pub struct ReqwestSiteTransport {
    client: Client,
}

impl ReqwestSiteTransport {
    /// Build a client from the session configuration. Every request reads
    /// and writes cookies through `cookies`.
    pub fn new(config: &RemoverConfig, cookies: Arc<CookieJar>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .cookie_provider(cookies)
            .default_headers(default_headers(config)?)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .redirect(Policy::limited(config.max_redirects))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .danger_accept_invalid_hostnames(config.accept_invalid_certs)
            .build()
            .map_err(|err| TransportError::Build(err.to_string()))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client. The client must already carry the
    /// cookie provider; otherwise the session will not survive between calls.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<SiteResponse, TransportError> {
        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        Ok(SiteResponse {
            status,
            headers,
            body,
            url,
        })
    }
}

#[async_trait]
impl SiteTransport for ReqwestSiteTransport {
    async fn get(&self, url: &Url, headers: &HeaderMap) -> Result<SiteResponse, TransportError> {
        let builder = self.client.get(url.clone()).headers(headers.clone());
        self.execute(builder).await
    }

    async fn post_form(
        &self,
        url: &Url,
        headers: &HeaderMap,
        form: &[(String, String)],
    ) -> Result<SiteResponse, TransportError> {
        let builder = self
            .client
            .post(url.clone())
            .headers(headers.clone())
            .form(form);
        self.execute(builder).await
    }
}

/// Browser-like headers attached to every request.
pub fn default_headers(config: &RemoverConfig) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, header_value("user-agent", &config.user_agent)?);
    headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        header_value("accept-language", &config.accept_language)?,
    );
    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|_| TransportError::Build(format!("invalid {name} header value")))
}

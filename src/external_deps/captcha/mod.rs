//! Captcha provider integrations.
//!
//! These adapters provide a unified interface for third-party reCAPTCHA
//! solvers (2Captcha and Anti-Captcha). Both services follow the same
//! create-then-poll protocol; the shared polling loop lives here so the
//! provider modules only describe their wire format.

mod anticaptcha;
mod twocaptcha;

pub use anticaptcha::AntiCaptchaProvider;
pub use twocaptcha::TwoCaptchaProvider;

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_POLLS: u32 = 60;

const TWO_CAPTCHA_BASE_URL: &str = "http://2captcha.com/";
const ANTI_CAPTCHA_BASE_URL: &str = "https://api.anti-captcha.com/";

/// Controls how long providers are polled for a finished task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollingConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Upper bound on the time spent polling one task.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLLS,
        }
    }
}

/// Base URLs of the supported solving services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaEndpoints {
    pub two_captcha: Url,
    pub anti_captcha: Url,
}

impl Default for CaptchaEndpoints {
    fn default() -> Self {
        Self {
            two_captcha: Url::parse(TWO_CAPTCHA_BASE_URL).expect("valid 2captcha base url"),
            anti_captcha: Url::parse(ANTI_CAPTCHA_BASE_URL).expect("valid anti-captcha base url"),
        }
    }
}

/// Supported solving services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptchaProviderKind {
    TwoCaptcha,
    AntiCaptcha,
}

impl CaptchaProviderKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            CaptchaProviderKind::TwoCaptcha => "2Captcha",
            CaptchaProviderKind::AntiCaptcha => "AntiCaptcha",
        }
    }
}

impl fmt::Display for CaptchaProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for CaptchaProviderKind {
    type Err = CaptchaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "2captcha" | "twocaptcha" => Ok(CaptchaProviderKind::TwoCaptcha),
            "anticaptcha" => Ok(CaptchaProviderKind::AntiCaptcha),
            other => Err(CaptchaError::Configuration(format!(
                "unknown captcha provider '{other}'"
            ))),
        }
    }
}

/// Which service to use and the account key to authenticate with.
#[derive(Clone, PartialEq, Eq)]
pub struct CaptchaConfig {
    pub provider: CaptchaProviderKind,
    pub api_key: String,
}

impl CaptchaConfig {
    pub fn new(provider: CaptchaProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
        }
    }

    /// A blank key means no solver is configured.
    pub fn is_usable(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for CaptchaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptchaConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// reCAPTCHA instance that needs a token.
#[derive(Debug, Clone)]
pub struct CaptchaTask {
    pub site_key: String,
    pub page_url: Url,
}

impl CaptchaTask {
    pub fn new(site_key: impl Into<String>, page_url: Url) -> Self {
        Self {
            site_key: site_key.into(),
            page_url,
        }
    }
}

/// Resolved captcha token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaSolution {
    pub token: String,
    pub task_id: Option<String>,
}

impl CaptchaSolution {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            task_id: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Common result type returned by captcha providers.
pub type CaptchaResult = Result<CaptchaSolution, CaptchaError>;

/// Shared interface implemented by captcha vendors.
#[async_trait]
pub trait CaptchaProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn solve(&self, task: &CaptchaTask) -> CaptchaResult;
}

/// Errors surfaced by captcha providers.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha provider misconfigured: {0}")]
    Configuration(String),
    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },
    #[error("{provider} timeout after {attempts} polls")]
    Timeout {
        provider: &'static str,
        attempts: u32,
    },
    #[error("captcha provider request failed: {0}")]
    Transport(String),
    #[error("unexpected captcha provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for CaptchaError {
    fn from(err: reqwest::Error) -> Self {
        CaptchaError::Transport(err.to_string())
    }
}

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Ready(String),
}

/// Build the provider selected by `config`.
pub fn provider_for(
    config: &CaptchaConfig,
    client: reqwest::Client,
    endpoints: &CaptchaEndpoints,
    polling: PollingConfig,
) -> Arc<dyn CaptchaProvider> {
    match config.provider {
        CaptchaProviderKind::TwoCaptcha => Arc::new(
            TwoCaptchaProvider::new(client, config.api_key.clone(), endpoints.two_captcha.clone())
                .with_polling(polling),
        ),
        CaptchaProviderKind::AntiCaptcha => Arc::new(
            AntiCaptchaProvider::new(client, config.api_key.clone(), endpoints.anti_captcha.clone())
                .with_polling(polling),
        ),
    }
}

/// Poll until the provider reports a token, an error, or the attempt budget
/// runs out. Every poll is preceded by one interval of waiting.
pub(crate) async fn poll_for_token<F, Fut>(
    provider: &'static str,
    polling: &PollingConfig,
    mut poll: F,
) -> Result<String, CaptchaError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<PollState, CaptchaError>>,
{
    for attempt in 1..=polling.max_attempts {
        sleep(polling.interval).await;

        match poll(attempt).await? {
            PollState::Ready(token) => {
                log::debug!("{provider} task ready after {attempt} polls");
                return Ok(token);
            }
            PollState::Pending => {
                log::trace!("{provider} task not ready (poll {attempt})");
            }
        }
    }

    Err(CaptchaError::Timeout {
        provider,
        attempts: polling.max_attempts,
    })
}

/// Read a provider reply as JSON, treating an empty body as malformed.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, CaptchaError> {
    let body = response.text().await?;
    if body.trim().is_empty() {
        return Err(CaptchaError::InvalidResponse("empty response".into()));
    }
    serde_json::from_str(&body).map_err(|err| CaptchaError::InvalidResponse(err.to_string()))
}

pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url, CaptchaError> {
    base.join(path)
        .map_err(|err| CaptchaError::Configuration(format!("invalid endpoint {base}{path}: {err}")))
}

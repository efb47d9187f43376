//! Settings and configuration module
//!
//! Provides unified configuration with:
//! - Builder pattern
//! - Overridable site and provider endpoints
//! - Transport, pacing and CAPTCHA escalation knobs

use std::time::Duration;

use url::Url;

use crate::external_deps::captcha::{CaptchaEndpoints, PollingConfig};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";
pub const DEFAULT_RECAPTCHA_SITE_KEY: &str = "6LcJyr4UAAAAAOy9Q_e9sDWPSHJ_aXus4UnYLfgL";
pub const DEFAULT_COOKIE_DOMAIN: &str = "dcinside.com";
pub const DEFAULT_SESSION_COOKIE: &str = "ci_c";

const LANDING_BASE_URL: &str = "https://www.dcinside.com/";
const SIGN_BASE_URL: &str = "https://sign.dcinside.com/";
const GALLOG_BASE_URL: &str = "https://gallog.dcinside.com/";

/// Base URLs of the three site surfaces the session talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteEndpoints {
    pub landing: Url,
    pub sign: Url,
    pub gallog: Url,
}

impl SiteEndpoints {
    pub fn new(landing: Url, sign: Url, gallog: Url) -> Self {
        Self {
            landing: with_trailing_slash(landing),
            sign: with_trailing_slash(sign),
            gallog: with_trailing_slash(gallog),
        }
    }

    /// Serve every surface from one origin (mock servers, proxies).
    pub fn single_host(base: Url) -> Self {
        let base = with_trailing_slash(base);
        Self {
            landing: base.clone(),
            sign: base.clone(),
            gallog: base,
        }
    }
}

impl Default for SiteEndpoints {
    fn default() -> Self {
        Self {
            landing: Url::parse(LANDING_BASE_URL).expect("valid landing url"),
            sign: Url::parse(SIGN_BASE_URL).expect("valid sign url"),
            gallog: Url::parse(GALLOG_BASE_URL).expect("valid gallog url"),
        }
    }
}

/// Complete session configuration.
#[derive(Debug, Clone)]
pub struct RemoverConfig {
    pub endpoints: SiteEndpoints,
    pub captcha_endpoints: CaptchaEndpoints,
    pub cookie_domain: String,
    pub session_cookie: String,
    pub recaptcha_site_key: String,
    pub user_agent: String,
    pub accept_language: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub accept_invalid_certs: bool,
    pub max_redirects: usize,
    pub item_delay: Duration,
    pub max_consecutive_captcha_failures: u32,
    pub polling: PollingConfig,
    pub progress_buffer: usize,
}

impl Default for RemoverConfig {
    fn default() -> Self {
        Self {
            endpoints: SiteEndpoints::default(),
            captcha_endpoints: CaptchaEndpoints::default(),
            cookie_domain: DEFAULT_COOKIE_DOMAIN.into(),
            session_cookie: DEFAULT_SESSION_COOKIE.into(),
            recaptcha_site_key: DEFAULT_RECAPTCHA_SITE_KEY.into(),
            user_agent: DEFAULT_USER_AGENT.into(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.into(),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            accept_invalid_certs: true,
            max_redirects: 10,
            item_delay: Duration::from_secs(1),
            max_consecutive_captcha_failures: 3,
            polling: PollingConfig::default(),
            progress_buffer: 64,
        }
    }
}

impl RemoverConfig {
    pub fn builder() -> RemoverConfigBuilder {
        RemoverConfigBuilder::new()
    }
}

/// Fluent builder for [`RemoverConfig`].
#[derive(Debug, Clone, Default)]
pub struct RemoverConfigBuilder {
    config: RemoverConfig,
}

impl RemoverConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RemoverConfig::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: SiteEndpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    pub fn with_captcha_endpoints(mut self, endpoints: CaptchaEndpoints) -> Self {
        self.config.captcha_endpoints = endpoints;
        self
    }

    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.cookie_domain = domain.into();
        self
    }

    pub fn with_session_cookie(mut self, name: impl Into<String>) -> Self {
        self.config.session_cookie = name.into();
        self
    }

    pub fn with_recaptcha_site_key(mut self, site_key: impl Into<String>) -> Self {
        self.config.recaptcha_site_key = site_key.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn with_accept_language(mut self, value: impl Into<String>) -> Self {
        self.config.accept_language = value.into();
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.config.connect_timeout = connect;
        self.config.read_timeout = read;
        self
    }

    pub fn strict_certificates(mut self) -> Self {
        self.config.accept_invalid_certs = false;
        self
    }

    pub fn with_max_redirects(mut self, redirects: usize) -> Self {
        self.config.max_redirects = redirects;
        self
    }

    pub fn with_item_delay(mut self, delay: Duration) -> Self {
        self.config.item_delay = delay;
        self
    }

    pub fn with_max_consecutive_captcha_failures(mut self, failures: u32) -> Self {
        self.config.max_consecutive_captcha_failures = failures.max(1);
        self
    }

    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.config.polling = polling;
        self
    }

    pub fn with_progress_buffer(mut self, capacity: usize) -> Self {
        self.config.progress_buffer = capacity.max(1);
        self
    }

    pub fn build(self) -> RemoverConfig {
        self.config
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_live_site() {
        let config = RemoverConfig::default();
        assert_eq!(config.endpoints.gallog.as_str(), "https://gallog.dcinside.com/");
        assert_eq!(config.item_delay, Duration::from_secs(1));
        assert_eq!(config.polling.budget(), Duration::from_secs(300));
        assert_eq!(config.max_consecutive_captcha_failures, 3);
    }

    #[test]
    fn single_host_endpoints_gain_trailing_slash() {
        let endpoints = SiteEndpoints::single_host(Url::parse("http://127.0.0.1:8080/mock").unwrap());
        assert_eq!(endpoints.gallog.as_str(), "http://127.0.0.1:8080/mock/");
        assert_eq!(
            endpoints.gallog.join("alice/posting").unwrap().as_str(),
            "http://127.0.0.1:8080/mock/alice/posting"
        );
    }

    #[test]
    fn builder_clamps_escalation_cap() {
        let config = RemoverConfig::builder()
            .with_max_consecutive_captcha_failures(0)
            .with_item_delay(Duration::ZERO)
            .build();
        assert_eq!(config.max_consecutive_captcha_failures, 1);
        assert_eq!(config.item_delay, Duration::ZERO);
    }
}

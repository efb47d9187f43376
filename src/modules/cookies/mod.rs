//! Domain-aware cookie storage shared by every request of a session.
//!
//! Cookies are kept in buckets keyed by either an exact host or a wildcard
//! domain (`.example.com`). Cookies issued anywhere inside the configured
//! site family are mirrored under the family wildcard so that a token set by
//! one subdomain is visible to its siblings.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::HeaderValue;
use url::Url;

/// Single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    /// Exact host for host-only cookies, `.domain` for wildcard cookies.
    pub domain: String,
    pub path: String,
    /// `None` marks a session cookie that never expires on its own.
    pub expires_at: Option<DateTime<Utc>>,
    pub secure: bool,
}

impl SessionCookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into().to_ascii_lowercase(),
            path: "/".into(),
            expires_at: None,
            secure: false,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Parse a `Set-Cookie` line received from `url`.
    ///
    /// Returns `None` for malformed lines and for `Domain` attributes that do
    /// not cover the responding host.
    pub fn parse(url: &Url, line: &str) -> Option<Self> {
        let parsed = cookie::Cookie::parse(line).ok()?;
        let host = url.host_str()?.to_ascii_lowercase();

        let domain = match parsed.domain().map(|d| d.trim_start_matches('.')) {
            Some(declared) if !declared.is_empty() => {
                let declared = declared.to_ascii_lowercase();
                if !host_in_domain(&host, &declared) {
                    log::debug!("rejecting cookie {} scoped to foreign domain {declared}", parsed.name());
                    return None;
                }
                format!(".{declared}")
            }
            _ => host,
        };

        let now = Utc::now();
        let expires_at = match (parsed.max_age(), parsed.expires_datetime()) {
            (Some(max_age), _) => TimeDelta::try_seconds(max_age.whole_seconds())
                .and_then(|delta| now.checked_add_signed(delta)),
            (None, Some(at)) => DateTime::<Utc>::from_timestamp(at.unix_timestamp(), 0),
            (None, None) => None,
        };

        let path = parsed
            .path()
            .filter(|path| path.starts_with('/'))
            .unwrap_or("/")
            .to_string();

        Some(Self {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            path,
            expires_at,
            secure: parsed.secure().unwrap_or(false),
        })
    }

    pub fn is_wildcard(&self) -> bool {
        self.domain.starts_with('.')
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }

    /// RFC 6265 style domain, path and scheme match against a request URL.
    pub fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();

        let domain_ok = if self.is_wildcard() {
            host_in_domain(&host, &self.domain[1..])
        } else {
            host == self.domain
        };

        domain_ok
            && path_matches(&self.path, url.path())
            && (!self.secure || url.scheme() == "https")
    }

    fn rescoped(&self, domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ..self.clone()
        }
    }
}

/// Thread-safe cookie store installed as the HTTP client's cookie provider.
#[derive(Debug)]
pub struct CookieJar {
    family: String,
    buckets: RwLock<HashMap<String, Vec<SessionCookie>>>,
}

impl CookieJar {
    /// Create a store for the site family rooted at `family_domain`
    /// (for example `dcinside.com`).
    pub fn new(family_domain: impl Into<String>) -> Self {
        let family = family_domain
            .into()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        Self {
            family,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    pub fn family_domain(&self) -> &str {
        &self.family
    }

    /// Store cookies received in a response from `url`.
    pub fn save<I>(&self, url: &Url, cookies: I)
    where
        I: IntoIterator<Item = SessionCookie>,
    {
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return;
        };
        let family_key = self.family_key();
        let mirror = self.in_family(&host);

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        for cookie in cookies {
            let key = if cookie.is_wildcard() {
                cookie.domain.clone()
            } else {
                host.clone()
            };

            if mirror && key != family_key {
                upsert(&mut buckets, &family_key, cookie.rescoped(&family_key));
            }
            upsert(&mut buckets, &key, cookie);
        }
    }

    /// Cookies that should accompany a request to `url`.
    pub fn load(&self, url: &Url) -> Vec<SessionCookie> {
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return Vec::new();
        };
        let now = Utc::now();
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);

        let mut result: Vec<SessionCookie> = Vec::new();
        for key in self.candidate_keys(&host) {
            let Some(bucket) = buckets.get(&key) else {
                continue;
            };
            for cookie in bucket {
                if cookie.is_expired(now) || !cookie.matches(url) {
                    continue;
                }
                let duplicate = result
                    .iter()
                    .any(|seen| seen.name == cookie.name && seen.value == cookie.value);
                if !duplicate {
                    result.push(cookie.clone());
                }
            }
        }
        result
    }

    /// Look up a live cookie value by host and name.
    pub fn get_cookie(&self, host: &str, name: &str) -> Option<String> {
        let host = host.to_ascii_lowercase();
        let now = Utc::now();
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);

        let mut keys = vec![host.clone()];
        if self.in_family(&host) {
            keys.push(self.family_key());
            keys.push(self.family.clone());
        }

        keys.iter()
            .filter_map(|key| buckets.get(key))
            .flat_map(|bucket| bucket.iter())
            .find(|cookie| cookie.name == name && !cookie.is_expired(now))
            .map(|cookie| cookie.value.clone())
    }

    pub fn clear(&self) {
        self.buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of entries across all buckets, expired ones included.
    pub fn len(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn family_key(&self) -> String {
        format!(".{}", self.family)
    }

    fn in_family(&self, host: &str) -> bool {
        !self.family.is_empty() && host_in_domain(host, &self.family)
    }

    fn candidate_keys(&self, host: &str) -> Vec<String> {
        let mut keys = vec![host.to_string()];
        if self.in_family(host) {
            push_unique(&mut keys, self.family_key());
            push_unique(&mut keys, self.family.clone());
        }

        let mut current = host;
        while let Some((_, parent)) = current.split_once('.') {
            push_unique(&mut keys, parent.to_string());
            push_unique(&mut keys, format!(".{parent}"));
            current = parent;
        }
        keys
    }
}

impl Default for CookieJar {
    fn default() -> Self {
        Self::new("dcinside.com")
    }
}

impl reqwest::cookie::CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let cookies: Vec<SessionCookie> = cookie_headers
            .filter_map(|value| value.to_str().ok())
            .filter_map(|line| SessionCookie::parse(url, line))
            .collect();
        if !cookies.is_empty() {
            self.save(url, cookies);
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .load(url)
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            return None;
        }
        HeaderValue::from_str(&header).ok()
    }
}

fn upsert(buckets: &mut HashMap<String, Vec<SessionCookie>>, key: &str, cookie: SessionCookie) {
    let bucket = buckets.entry(key.to_string()).or_default();
    bucket.retain(|existing| existing.name != cookie.name);
    bucket.push(cookie);
}

fn push_unique(keys: &mut Vec<String>, key: String) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}

fn host_in_domain(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_matches(cookie_path: &str, request_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }

    if let Some(rest) = request_path.strip_prefix(cookie_path) {
        return cookie_path.ends_with('/') || rest.starts_with('/');
    }

    false
}

//! Event system for session traffic.
//!
//! Provides hooks for logging and custom reactions around every request the
//! orchestrator issues and every CAPTCHA it tries to solve.

use chrono::{DateTime, Utc};
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Structured request event.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    pub url: Url,
    pub method: Method,
    pub timestamp: DateTime<Utc>,
}

/// Structured response event.
#[derive(Debug, Clone)]
pub struct ResponseEvent {
    pub url: Url,
    pub method: Method,
    pub status: u16,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CaptchaEvent {
    pub provider: &'static str,
    pub page_url: Url,
    pub success: bool,
    pub detail: Option<String>,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub context: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Request(RequestEvent),
    Response(ResponseEvent),
    Captcha(CaptchaEvent),
    Error(ErrorEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &SessionEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: SessionEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }

    pub fn error(&self, context: impl Into<String>, error: impl ToString) {
        self.dispatch(SessionEvent::Error(ErrorEvent {
            context: context.into(),
            error: error.to_string(),
            timestamp: Utc::now(),
        }));
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::Request(req) => {
                log::debug!("-> {} {}", req.method, redact(&req.url));
            }
            SessionEvent::Response(resp) => {
                log::debug!(
                    "<- {} {} -> {} ({:.2}s)",
                    resp.method,
                    redact(&resp.url),
                    resp.status,
                    resp.latency.as_secs_f64()
                );
            }
            SessionEvent::Captcha(captcha) => {
                log::info!(
                    "captcha via {} for {} success={} ({:.1}s)",
                    captcha.provider,
                    captcha.page_url,
                    captcha.success,
                    captcha.elapsed.as_secs_f64()
                );
                if let Some(ref detail) = captcha.detail {
                    log::warn!("captcha via {} -> {}", captcha.provider, detail);
                }
            }
            SessionEvent::Error(error) => {
                log::warn!("warning {} -> {}", error.context, error.error);
            }
        }
    }
}

/// Strip the query string so provider keys never reach the log.
fn redact(url: &Url) -> String {
    let mut shown = url.clone();
    if shown.query().is_some() {
        shown.set_query(Some("redacted"));
    }
    shown.to_string()
}

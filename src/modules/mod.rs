//! Cross-cutting services module
//!
//! Session-wide state (cookies) and observability hooks (events) shared by
//! the orchestrator and the transport.

pub mod cookies;
pub mod events;

// Re-export commonly used types
pub use cookies::{CookieJar, SessionCookie};
pub use events::{
    CaptchaEvent, ErrorEvent, EventDispatcher, EventHandler, LoggingHandler, RequestEvent,
    ResponseEvent, SessionEvent,
};

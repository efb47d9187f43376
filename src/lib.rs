//! # gallog-cleaner
//!
//! Bulk removal of a DCInside account's posts and comments, driven through
//! the same HTTP endpoints a browser session uses.
//!
//! ## Features
//!
//! - Browser-like login handshake with a shared, domain-aware cookie store
//! - Gallery and item enumeration from the account's gallog
//! - Sequential, paced deletion with progress reporting and cancellation
//! - Optional reCAPTCHA solving through 2Captcha or Anti-Captcha
//!
//! ## Example
//!
//! ```no_run
//! use gallog_cleaner::{GallogRemover, LoginResult, PostType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let remover = GallogRemover::new()?;
//!     if remover.login("my_id", "my_password").await != LoginResult::Success {
//!         return Ok(());
//!     }
//!
//!     let mut run = remover.run_deletion_pipeline(PostType::Comment, None, None);
//!     while let Some(progress) = run.next().await {
//!         println!("{}/{} {}", progress.current, progress.total, progress.message);
//!     }
//!     Ok(())
//! }
//! ```

mod remover;

pub mod config;
pub mod external_deps;
pub mod modules;
pub mod site;

pub use crate::remover::{GallogRemover, GallogRemoverBuilder, RemoverError, RemoverResult};

pub use crate::config::{RemoverConfig, RemoverConfigBuilder, SiteEndpoints};

pub use crate::site::{
    CaptchaState, DeletionOutcome, DeletionPipeline, GalleryInfo, GallogSite, LoginResult,
    PipelineHandle, PostType, Progress, ReqwestSiteTransport, SiteResponse, SiteTransport,
    TransportError,
};

pub use crate::external_deps::captcha::{
    AntiCaptchaProvider, CaptchaConfig, CaptchaEndpoints, CaptchaError, CaptchaProvider,
    CaptchaProviderKind, CaptchaResult, CaptchaSolution, CaptchaTask, PollingConfig,
    TwoCaptchaProvider, provider_for,
};

pub use crate::modules::{
    CaptchaEvent, CookieJar, ErrorEvent, EventDispatcher, EventHandler, LoggingHandler,
    RequestEvent, ResponseEvent, SessionCookie, SessionEvent,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

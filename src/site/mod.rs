//! Gallog site protocol and the deletion pipeline built on it.

pub mod core;
pub mod gallog;
pub mod pipeline;

pub use self::core::{
    CaptchaState, DeletionOutcome, GalleryInfo, LoginResult, PostType, Progress,
    ReqwestSiteTransport, SiteResponse, SiteTransport, TransportError,
};
pub use gallog::{DeletionAttempt, GallogSite};
pub use pipeline::{DeletionPipeline, PipelineHandle};

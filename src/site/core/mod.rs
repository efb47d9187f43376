//! Core utilities shared by the site client and the deletion pipeline.

pub mod extract;
pub mod reqwest_client;
pub mod transport;
pub mod types;

pub use extract::{
    MISSING_SERVICE_CODE, classify_deletion_response, cookie_from_set_cookie, gallery_list,
    has_logout_marker, login_form_fields, post_ids, service_code,
};
pub use reqwest_client::ReqwestSiteTransport;
pub use transport::{SiteResponse, SiteTransport, TransportError};
pub use types::{CaptchaState, DeletionOutcome, GalleryInfo, LoginResult, PostType, Progress};

//! High level session orchestration.
//!
//! Owns the login session, the shared cookie store and the site client, and
//! hands out deletion pipelines bound to the logged-in account.

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use url::Url;

use crate::config::RemoverConfig;
use crate::external_deps::captcha::{CaptchaConfig, CaptchaProvider, provider_for};
use crate::modules::cookies::CookieJar;
use crate::modules::events::{EventDispatcher, EventHandler, LoggingHandler};
use crate::site::core::{
	GalleryInfo, LoginResult, PostType, Progress, ReqwestSiteTransport, SiteTransport,
	TransportError,
};
use crate::site::gallog::GallogSite;
use crate::site::pipeline::{DeletionPipeline, PipelineHandle};

/// Result alias used across the orchestration layer.
pub type RemoverResult<T> = Result<T, RemoverError>;

/// High-level error surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum RemoverError {
	#[error("http error: {0}")]
	Http(#[from] reqwest::Error),
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error(transparent)]
	Transport(#[from] TransportError),
	#[error("invalid {0} header value")]
	InvalidHeader(String),
	#[error("not logged in")]
	NotLoggedIn,
	#[error("unexpected status {status} from {url}")]
	UnexpectedStatus { status: u16, url: Url },
	#[error("empty {0} response")]
	EmptyBody(&'static str),
}

#[derive(Debug, Clone)]
struct Session {
	user_id: String,
}

/// Builder for [`GallogRemover`].
pub struct GallogRemoverBuilder {
	config: RemoverConfig,
	transport: Option<Arc<dyn SiteTransport>>,
	cookies: Option<Arc<CookieJar>>,
	handlers: Vec<Arc<dyn EventHandler>>,
}

impl GallogRemoverBuilder {
	pub fn new() -> Self {
		Self {
			config: RemoverConfig::default(),
			transport: None,
			cookies: None,
			handlers: Vec::new(),
		}
	}

	pub fn with_config(mut self, config: RemoverConfig) -> Self {
		self.config = config;
		self
	}

	/// Replace the reqwest transport. The transport is responsible for
	/// feeding the cookie store passed to [`Self::with_cookie_jar`].
	pub fn with_transport(mut self, transport: Arc<dyn SiteTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Share a cookie store with other sessions of the same host.
	pub fn with_cookie_jar(mut self, cookies: Arc<CookieJar>) -> Self {
		self.cookies = Some(cookies);
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn build(self) -> RemoverResult<GallogRemover> {
		GallogRemover::from_builder(self)
	}
}

impl Default for GallogRemoverBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Logs into the site and removes the account's posts and comments.
pub struct GallogRemover {
	config: Arc<RemoverConfig>,
	cookies: Arc<CookieJar>,
	site: Arc<GallogSite>,
	captcha_client: reqwest::Client,
	session: RwLock<Option<Session>>,
}

impl GallogRemover {
	/// Construct a remover with default configuration.
	pub fn new() -> RemoverResult<Self> {
		GallogRemoverBuilder::new().build()
	}

	/// Obtain a builder to customise the remover instance.
	pub fn builder() -> GallogRemoverBuilder {
		GallogRemoverBuilder::new()
	}

	fn from_builder(builder: GallogRemoverBuilder) -> RemoverResult<Self> {
		let config = Arc::new(builder.config);
		let cookies = builder
			.cookies
			.unwrap_or_else(|| Arc::new(CookieJar::new(config.cookie_domain.clone())));

		let transport: Arc<dyn SiteTransport> = match builder.transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestSiteTransport::new(&config, cookies.clone())?),
		};

		let captcha_client = reqwest::Client::builder()
			.connect_timeout(config.connect_timeout)
			.read_timeout(config.read_timeout)
			.build()?;

		let mut events = EventDispatcher::new();
		events.register_handler(Arc::new(LoggingHandler));
		for handler in builder.handlers {
			events.register_handler(handler);
		}

		let site = Arc::new(GallogSite::new(
			transport,
			cookies.clone(),
			config.clone(),
			Arc::new(events),
		));

		Ok(Self {
			config,
			cookies,
			site,
			captcha_client,
			session: RwLock::new(None),
		})
	}

	pub fn config(&self) -> &RemoverConfig {
		&self.config
	}

	pub fn cookies(&self) -> &Arc<CookieJar> {
		&self.cookies
	}

	/// Log in with the given credentials. The identity is lower-cased before
	/// it is submitted and stored; a blank identity is rejected without
	/// touching the network.
	pub async fn login(&self, user_id: &str, password: &str) -> LoginResult {
		let user_id = user_id.to_lowercase();
		if user_id.trim().is_empty() {
			log::warn!("login attempted with an empty user id");
			return LoginResult::Error("user id is empty".into());
		}

		match self.site.login(&user_id, password).await {
			Ok(true) => {
				log::info!("logged in as {user_id}");
				*self.session.write().unwrap_or_else(PoisonError::into_inner) =
					Some(Session { user_id });
				LoginResult::Success
			}
			Ok(false) => {
				log::warn!("login rejected for {user_id}");
				LoginResult::InvalidCredentials
			}
			Err(err) => {
				log::warn!("login failed for {user_id}: {err}");
				LoginResult::Error(err.to_string())
			}
		}
	}

	pub fn is_logged_in(&self) -> bool {
		self.user_id().is_some()
	}

	/// Identity of the current session, lower-cased.
	pub fn user_id(&self) -> Option<String> {
		self.session
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.map(|session| session.user_id.clone())
			.filter(|user_id| !user_id.is_empty())
	}

	fn require_user(&self) -> RemoverResult<String> {
		self.user_id().ok_or(RemoverError::NotLoggedIn)
	}

	/// Galleries the account has content in for `post_type`.
	pub async fn get_galleries(&self, post_type: PostType) -> RemoverResult<Vec<GalleryInfo>> {
		let user_id = self.require_user()?;
		self.site.galleries(&user_id, post_type).await
	}

	/// Item identifiers on one listing page. An empty result marks the end.
	pub async fn get_post_ids(
		&self,
		post_type: PostType,
		gallery_id: Option<&str>,
		page: u32,
	) -> RemoverResult<Vec<String>> {
		let user_id = self.require_user()?;
		self.site.post_ids(&user_id, post_type, gallery_id, page).await
	}

	/// Start deleting every item of `post_type`, optionally limited to one
	/// gallery. A config with a blank API key counts as no solver.
	///
	/// Must be called from within a Tokio runtime.
	pub fn run_deletion_pipeline(
		&self,
		post_type: PostType,
		gallery_id: Option<String>,
		captcha: Option<CaptchaConfig>,
	) -> PipelineHandle {
		let solver = captcha.filter(CaptchaConfig::is_usable).map(|config| {
			log::info!("captcha solving enabled via {}", config.provider);
			provider_for(
				&config,
				self.captcha_client.clone(),
				&self.config.captcha_endpoints,
				self.config.polling,
			)
		});
		self.run_deletion_pipeline_with_solver(post_type, gallery_id, solver)
	}

	/// Same as [`Self::run_deletion_pipeline`] with a caller-supplied solver.
	pub fn run_deletion_pipeline_with_solver(
		&self,
		post_type: PostType,
		gallery_id: Option<String>,
		solver: Option<Arc<dyn CaptchaProvider>>,
	) -> PipelineHandle {
		let Some(user_id) = self.user_id() else {
			log::warn!("deletion pipeline requested without a session");
			return PipelineHandle::finished_with(Progress::new(0, 0, "not logged in"));
		};

		DeletionPipeline::new(self.site.clone(), user_id, post_type, gallery_id, solver).spawn()
	}

	/// Forget the session identity and every stored cookie.
	pub fn logout(&self) {
		let previous = self
			.session
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.take();
		self.cookies.clear();
		if let Some(session) = previous {
			log::info!("logged out {}", session.user_id);
		}
	}
}

//! Protocol steps against the gallog site.
//!
//! [`GallogSite`] knows the site's URLs, headers and form layouts. It is
//! shared (behind an `Arc`) by the orchestrator and every pipeline run; the
//! only mutable state it touches is the cookie store.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use http::Method;
use http::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER};
use url::Url;

use super::core::extract;
use super::core::{DeletionOutcome, GalleryInfo, PostType, SiteResponse, SiteTransport};
use crate::config::RemoverConfig;
use crate::external_deps::captcha::{CaptchaProvider, CaptchaTask};
use crate::modules::cookies::CookieJar;
use crate::modules::events::{CaptchaEvent, EventDispatcher, RequestEvent, ResponseEvent, SessionEvent};
use crate::remover::{RemoverError, RemoverResult};

const LOGIN_PATH: &str = "login/member_check";
const USER_ID_FIELD: &str = "user_id";
const PASSWORD_FIELD: &str = "pw";
const RECAPTCHA_FIELD: &str = "g-recaptcha-response";
const DELETE_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

static X_REQUESTED_WITH: HeaderName = HeaderName::from_static("x-requested-with");

/// Result of one deletion attempt plus whether a solved CAPTCHA token rode along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionAttempt {
    pub outcome: DeletionOutcome,
    pub captcha_solved: bool,
}

impl DeletionAttempt {
    fn plain(outcome: DeletionOutcome) -> Self {
        Self {
            outcome,
            captcha_solved: false,
        }
    }
}

/// Site client shared by the orchestrator and pipeline runs.
pub struct GallogSite {
    transport: Arc<dyn SiteTransport>,
    cookies: Arc<CookieJar>,
    config: Arc<RemoverConfig>,
    events: Arc<EventDispatcher>,
}

impl GallogSite {
    pub fn new(
        transport: Arc<dyn SiteTransport>,
        cookies: Arc<CookieJar>,
        config: Arc<RemoverConfig>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            transport,
            cookies,
            config,
            events,
        }
    }

    pub fn cookies(&self) -> &Arc<CookieJar> {
        &self.cookies
    }

    pub fn config(&self) -> &RemoverConfig {
        &self.config
    }

    /// The user's content page for a category; also the deletion `Referer`.
    pub fn gallog_url(&self, user_id: &str, post_type: PostType) -> RemoverResult<Url> {
        Ok(self
            .config
            .endpoints
            .gallog
            .join(&format!("{user_id}/{}", post_type.path()))?)
    }

    fn index_url(
        &self,
        user_id: &str,
        post_type: PostType,
        gallery_id: Option<&str>,
        page: u32,
    ) -> RemoverResult<Url> {
        let mut url = self
            .config
            .endpoints
            .gallog
            .join(&format!("{user_id}/{}/index", post_type.path()))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(gallery) = gallery_id {
                query.append_pair("cno", gallery);
            }
            query.append_pair("p", &page.to_string());
        }
        Ok(url)
    }

    fn delete_url(&self, user_id: &str) -> RemoverResult<Url> {
        Ok(self
            .config
            .endpoints
            .gallog
            .join(&format!("{user_id}/ajax/log_list_ajax/delete"))?)
    }

    /// Run the three-step login handshake. Returns whether the landing page
    /// shows the logged-in marker afterwards.
    pub async fn login(&self, user_id: &str, password: &str) -> RemoverResult<bool> {
        let landing = self.config.endpoints.landing.clone();
        let landing_headers = header_map(&[(REFERER, landing.as_str())])?;

        let (_, html) = self
            .fetch_html(&landing, &landing_headers, "landing page")
            .await?;
        let mut form = extract::login_form_fields(&html);
        set_field(&mut form, USER_ID_FIELD, user_id);
        set_field(&mut form, PASSWORD_FIELD, password);

        let sign_url = self.config.endpoints.sign.join(LOGIN_PATH)?;
        let sign_headers = header_map(&[
            (X_REQUESTED_WITH.clone(), "XMLHttpRequest"),
            (REFERER, landing.as_str()),
        ])?;
        let reply = self.send_form(&sign_url, &sign_headers, &form).await?;
        log::debug!("login endpoint answered {}", reply.status);

        let (_, html) = self
            .fetch_html(&landing, &landing_headers, "landing page")
            .await?;
        Ok(extract::has_logout_marker(&html))
    }

    pub async fn galleries(
        &self,
        user_id: &str,
        post_type: PostType,
    ) -> RemoverResult<Vec<GalleryInfo>> {
        let url = self.gallog_url(user_id, post_type)?;
        let (_, html) = self.fetch_html(&url, &HeaderMap::new(), "gallog page").await?;
        Ok(extract::gallery_list(&html))
    }

    /// One listing page; an empty vector marks the end of the list.
    pub async fn post_ids(
        &self,
        user_id: &str,
        post_type: PostType,
        gallery_id: Option<&str>,
        page: u32,
    ) -> RemoverResult<Vec<String>> {
        let url = self.index_url(user_id, post_type, gallery_id, page)?;
        let (_, html) = self.fetch_html(&url, &HeaderMap::new(), "listing page").await?;
        Ok(extract::post_ids(&html))
    }

    /// Attempt to delete one item. Never fails: faults become
    /// [`DeletionOutcome::Failed`]. When `solver` is given a CAPTCHA token is
    /// solved first and attached if solving succeeds.
    pub async fn delete_post(
        &self,
        user_id: &str,
        post_type: PostType,
        post_no: &str,
        solver: Option<&dyn CaptchaProvider>,
    ) -> DeletionAttempt {
        match self.try_delete(user_id, post_type, post_no, solver).await {
            Ok(attempt) => attempt,
            Err(err) => {
                self.events.error(format!("delete {post_no}"), &err);
                DeletionAttempt::plain(DeletionOutcome::Failed(err.to_string()))
            }
        }
    }

    async fn try_delete(
        &self,
        user_id: &str,
        post_type: PostType,
        post_no: &str,
        solver: Option<&dyn CaptchaProvider>,
    ) -> RemoverResult<DeletionAttempt> {
        let page_url = self.gallog_url(user_id, post_type)?;
        let (page, html) = self
            .fetch_html(&page_url, &HeaderMap::new(), "gallog page")
            .await?;

        let cookie_name = self.config.session_cookie.as_str();
        let token = extract::cookie_from_set_cookie(&page.headers, cookie_name).or_else(|| {
            page_url
                .host_str()
                .and_then(|host| self.cookies.get_cookie(host, cookie_name))
        });
        let Some(token) = token else {
            return Ok(DeletionAttempt::plain(DeletionOutcome::Failed(format!(
                "{cookie_name} cookie not found"
            ))));
        };

        let mut form = vec![
            ("ci_t".to_string(), token),
            ("no".to_string(), post_no.to_string()),
            ("service_code".to_string(), extract::service_code(&html)),
        ];

        let mut captcha_solved = false;
        if let Some(solver) = solver
            && let Some(captcha_token) = self.solve_captcha(solver, &page_url).await
        {
            form.push((RECAPTCHA_FIELD.to_string(), captcha_token));
            captcha_solved = true;
        }

        let origin = page_url.origin().ascii_serialization();
        let headers = header_map(&[
            (ACCEPT, DELETE_ACCEPT),
            (ORIGIN, origin.as_str()),
            (REFERER, page_url.as_str()),
            (X_REQUESTED_WITH.clone(), "XMLHttpRequest"),
        ])?;

        let reply = self
            .send_form(&self.delete_url(user_id)?, &headers, &form)
            .await?;
        if !reply.is_success() {
            return Err(RemoverError::UnexpectedStatus {
                status: reply.status,
                url: reply.url,
            });
        }

        let body = reply.text();
        let outcome = if body.trim().is_empty() {
            DeletionOutcome::Failed("empty response".into())
        } else {
            extract::classify_deletion_response(&body)
        };

        Ok(DeletionAttempt {
            outcome,
            captcha_solved,
        })
    }

    async fn solve_captcha(&self, solver: &dyn CaptchaProvider, page_url: &Url) -> Option<String> {
        let task = CaptchaTask::new(self.config.recaptcha_site_key.clone(), page_url.clone());
        let started = Instant::now();
        let result = solver.solve(&task).await;

        self.events.dispatch(SessionEvent::Captcha(CaptchaEvent {
            provider: solver.name(),
            page_url: page_url.clone(),
            success: result.is_ok(),
            detail: result.as_ref().err().map(ToString::to_string),
            elapsed: started.elapsed(),
            timestamp: Utc::now(),
        }));

        result.ok().map(|solution| solution.token)
    }

    async fn fetch_html(
        &self,
        url: &Url,
        headers: &HeaderMap,
        what: &'static str,
    ) -> RemoverResult<(SiteResponse, String)> {
        let response = self.send(Method::GET, url, headers, None).await?;
        if !response.is_success() {
            return Err(RemoverError::UnexpectedStatus {
                status: response.status,
                url: response.url,
            });
        }

        let html = response.text();
        if html.trim().is_empty() {
            return Err(RemoverError::EmptyBody(what));
        }
        Ok((response, html))
    }

    async fn send_form(
        &self,
        url: &Url,
        headers: &HeaderMap,
        form: &[(String, String)],
    ) -> RemoverResult<SiteResponse> {
        self.send(Method::POST, url, headers, Some(form)).await
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        headers: &HeaderMap,
        form: Option<&[(String, String)]>,
    ) -> RemoverResult<SiteResponse> {
        self.events.dispatch(SessionEvent::Request(RequestEvent {
            url: url.clone(),
            method: method.clone(),
            timestamp: Utc::now(),
        }));

        let started = Instant::now();
        let result = match form {
            Some(form) => self.transport.post_form(url, headers, form).await,
            None => self.transport.get(url, headers).await,
        };

        match result {
            Ok(response) => {
                self.events.dispatch(SessionEvent::Response(ResponseEvent {
                    url: response.url.clone(),
                    method,
                    status: response.status,
                    latency: started.elapsed(),
                    timestamp: Utc::now(),
                }));
                Ok(response)
            }
            Err(err) => {
                self.events.error(format!("{method} {url}"), &err);
                Err(err.into())
            }
        }
    }
}

/// Overwrite a form field in place, appending it when missing.
fn set_field(form: &mut Vec<(String, String)>, name: &str, value: &str) {
    match form.iter_mut().find(|(field, _)| field == name) {
        Some(entry) => entry.1 = value.to_string(),
        None => form.push((name.to_string(), value.to_string())),
    }
}

fn header_map(pairs: &[(HeaderName, &str)]) -> RemoverResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let value = HeaderValue::from_str(value)
            .map_err(|_| RemoverError::InvalidHeader(name.to_string()))?;
        headers.insert(name.clone(), value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_field_overwrites_and_appends() {
        let mut form = vec![
            ("s_url".to_string(), "x".to_string()),
            ("user_id".to_string(), String::new()),
        ];
        set_field(&mut form, "user_id", "alice");
        set_field(&mut form, "pw", "secret");
        assert_eq!(form[1], ("user_id".to_string(), "alice".to_string()));
        assert_eq!(form[2], ("pw".to_string(), "secret".to_string()));
        assert_eq!(form.len(), 3);
    }
}

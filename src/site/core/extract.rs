//! Gallog page parsing helpers.
//!
//! Stateless functions that pull form fields, gallery lists, item ids and
//! hidden tokens out of raw HTML, plus the deletion reply classifier.

use http::header::HeaderMap;
use http::header::SET_COOKIE;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::types::{DeletionOutcome, GalleryInfo};

/// Value the deletion endpoint accepts when the page carries no service code.
pub const MISSING_SERVICE_CODE: &str = "undefined";

static LOGIN_INPUTS: Lazy<Selector> = Lazy::new(|| selector("#login_process > input"));
static LOGOUT_MARKER: Lazy<Selector> = Lazy::new(|| selector(".logout"));
static GALLERY_ITEMS: Lazy<Selector> =
    Lazy::new(|| selector("div.option_sort.gallog > div > ul > li"));
static POST_ITEMS: Lazy<Selector> = Lazy::new(|| selector(".cont_listbox > li"));
static SERVICE_CODE: Lazy<Selector> = Lazy::new(|| selector("input[name=service_code]"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("invalid gallog selector")
}

/// Named `<input>` fields of the landing page login form. Each name appears
/// once, at its first position, carrying the value of its last occurrence.
pub fn login_form_fields(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let mut fields: Vec<(String, String)> = Vec::new();
    for input in document.select(&LOGIN_INPUTS) {
        let Some(name) = input.value().attr("name").filter(|name| !name.is_empty()) else {
            continue;
        };
        let value = input.value().attr("value").unwrap_or_default().to_string();
        match fields.iter_mut().find(|(field, _)| field == name) {
            Some(entry) => entry.1 = value,
            None => fields.push((name.to_string(), value)),
        }
    }
    fields
}

/// Whether the page shows the logged-in marker.
pub fn has_logout_marker(html: &str) -> bool {
    Html::parse_document(html)
        .select(&LOGOUT_MARKER)
        .next()
        .is_some()
}

/// Galleries listed in the gallog filter; entries without `data-value` are skipped.
pub fn gallery_list(html: &str) -> Vec<GalleryInfo> {
    let document = Html::parse_document(html);
    document
        .select(&GALLERY_ITEMS)
        .filter_map(|item| {
            let id = item
                .value()
                .attr("data-value")
                .filter(|value| !value.is_empty())?;
            Some(GalleryInfo {
                id: id.to_string(),
                name: normalized_text(&item),
            })
        })
        .collect()
}

/// Item identifiers (`data-no`) of one listing page, in page order.
pub fn post_ids(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&POST_ITEMS)
        .filter_map(|item| item.value().attr("data-no"))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Hidden `service_code` value; an input without `value` yields `""`.
pub fn service_code(html: &str) -> String {
    Html::parse_document(html)
        .select(&SERVICE_CODE)
        .next()
        .map(|input| input.value().attr("value").unwrap_or_default().to_string())
        .unwrap_or_else(|| MISSING_SERVICE_CODE.to_string())
}

/// Raw value of cookie `name` as set by this response, up to the first `;`.
pub fn cookie_from_set_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|line| line.trim_start().strip_prefix(prefix.as_str()))
        .map(|rest| rest.split(';').next().unwrap_or_default().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Classify the deletion endpoint's reply by substring, success first.
pub fn classify_deletion_response(body: &str) -> DeletionOutcome {
    if body.contains("success") {
        DeletionOutcome::Success
    } else if body.contains("captcha") {
        DeletionOutcome::CaptchaRequired
    } else {
        DeletionOutcome::Failed(body.to_string())
    }
}

fn normalized_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

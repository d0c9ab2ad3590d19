//! HTTP handlers and the state they share.

use crate::services::{directory_store::DirectoryObjectStore, gallery_service::GalleryService};
use axum::http::{HeaderMap, HeaderValue, header};
use std::sync::Arc;

pub mod gallery_handlers;
pub mod health_handlers;
pub mod profile_handlers;
pub mod raw_handlers;

/// Cookies written by the API persist for 30 days.
pub const COOKIE_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Clone)]
pub struct AppState {
    pub gallery: Arc<GalleryService>,

    /// Directory backend, used directly by the signed `/raw` route and readiness probe.
    pub files: DirectoryObjectStore,
}

/// Value of cookie `name` from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}

/// `Set-Cookie` value for a site-wide cookie kept for [`COOKIE_MAX_AGE_SECS`].
pub fn persistent_cookie(name: &str, value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Max-Age={}; Path=/; SameSite=Lax",
        name,
        urlencoding::encode(value),
        COOKIE_MAX_AGE_SECS
    ))
    .ok()
}

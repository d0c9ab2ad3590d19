//! Saved bucket profiles, profile switching and display preferences.

use crate::{
    errors::AppError,
    handlers::{AppState, cookie_value, persistent_cookie},
    models::profile::BucketProfile,
    services::gallery_service::GalleryError,
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ALIAS_COOKIE: &str = "bucket-alias";
pub const IMAGE_SIZE_COOKIE: &str = "imageSize";

/// A profile as shown to the browser; credentials are never echoed back.
#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub alias: String,
    pub bucket_name: String,
    pub region: String,
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SaveProfileReq {
    pub bucket_name: String,
    pub region: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub alias: String,
    pub bucket_name: String,
    pub versioning_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    #[serde(rename = "imageSize")]
    pub image_size: Option<u32>,
}

/// Switch to the profile remembered in the `bucket-alias` cookie when it is
/// not already active. An unknown alias, or no cache to look it up in, leaves
/// the current session alone.
pub async fn restore_cookie_profile(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(alias) = cookie_value(headers, ALIAS_COOKIE) else {
        return Ok(());
    };
    let active = state.gallery.session().await.ok();
    if active.is_some_and(|s| s.profile.alias == alias) {
        return Ok(());
    }
    match state.gallery.activate_alias(&alias).await {
        Ok(_) => Ok(()),
        Err(err @ (GalleryError::ProfileNotFound(_) | GalleryError::CacheUnavailable)) => {
            warn!("Ignoring `{}` cookie: {}", ALIAS_COOKIE, err);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

/// `GET /api/profiles`
pub async fn list_profiles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProfileSummary>>, AppError> {
    restore_cookie_profile(&state, &headers).await?;
    let active = state
        .gallery
        .session()
        .await
        .ok()
        .map(|s| s.profile.alias.clone());
    let profiles = state
        .gallery
        .list_profiles()
        .await?
        .into_iter()
        .map(|p| ProfileSummary {
            active: active.as_deref() == Some(p.alias.as_str()),
            alias: p.alias,
            bucket_name: p.bucket_name,
            region: p.region,
        })
        .collect();
    Ok(Json(profiles))
}

/// `PUT /api/profiles/{alias}`: create or replace a profile.
pub async fn save_profile(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    Json(req): Json<SaveProfileReq>,
) -> Result<impl IntoResponse, AppError> {
    if alias.trim().is_empty() || req.bucket_name.trim().is_empty() {
        return Err(AppError::bad_request("alias and bucket_name are required"));
    }
    let profile = BucketProfile {
        alias,
        bucket_name: req.bucket_name,
        region: req.region,
        access_key_id: req.access_key_id,
        secret_access_key: req.secret_access_key,
    };
    state.gallery.save_profile(&profile).await?;
    tracing::info!("Saved bucket profile `{}`", profile.alias);
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/profiles/{alias}/activate`: switch bucket and remember the choice.
pub async fn activate_profile(
    State(state): State<AppState>,
    Path(alias): Path<String>,
) -> Result<Response, AppError> {
    let session = state.gallery.activate_alias(&alias).await?;
    let body = SessionSummary {
        alias: session.profile.alias.clone(),
        bucket_name: session.bucket().to_string(),
        versioning_enabled: session.versioning_enabled,
    };

    let mut response = Json(body).into_response();
    if let Some(cookie) = persistent_cookie(ALIAS_COOKIE, &alias) {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    Ok(response)
}

/// `GET /api/preferences`
pub async fn get_preferences(headers: HeaderMap) -> Json<Preferences> {
    let image_size = cookie_value(&headers, IMAGE_SIZE_COOKIE).and_then(|v| v.parse().ok());
    Json(Preferences { image_size })
}

/// `PUT /api/preferences`
pub async fn put_preferences(Json(prefs): Json<Preferences>) -> Response {
    let mut response = Json(&prefs).into_response();
    if let Some(cookie) = prefs
        .image_size
        .and_then(|size| persistent_cookie(IMAGE_SIZE_COOKIE, &size.to_string()))
    {
        response.headers_mut().insert(header::SET_COOKIE, cookie);
    }
    response
}

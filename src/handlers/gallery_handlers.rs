//! Gallery views, per-object payloads and the info panel.

use crate::{
    errors::AppError,
    handlers::{AppState, profile_handlers::restore_cookie_profile},
    services::{
        gallery_service::{GalleryView, ObjectInfo},
        resolver::ResolvedPayload,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
pub struct GalleryQuery {
    pub prefix: Option<String>,
    /// Client view id (one per browser tab). A newer navigation from the same
    /// view supersedes an older one still in flight.
    pub view: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectQuery {
    #[serde(rename = "versionId")]
    pub version_id: Option<String>,
}

/// `GET /api/gallery?prefix=`
pub async fn gallery(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<GalleryQuery>,
) -> Result<Json<GalleryView>, AppError> {
    restore_cookie_profile(&state, &headers).await?;
    let prefix = query.prefix.unwrap_or_default();
    debug!("rendering gallery for prefix `{}`", prefix);
    let view = state
        .gallery
        .gallery(&prefix, query.view.as_deref())
        .await?;
    Ok(Json(view))
}

/// `GET /api/objects/{*key}?versionId=`
pub async fn object_payload(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<ObjectQuery>,
) -> Result<Json<ResolvedPayload>, AppError> {
    let payload = state
        .gallery
        .object_payload(&key, query.version_id.as_deref())
        .await?;
    Ok(Json(payload))
}

/// `GET /api/info/{*key}`
pub async fn object_info(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<ObjectInfo>, AppError> {
    Ok(Json(state.gallery.object_info(&key).await?))
}

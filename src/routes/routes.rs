//! Defines routes for the gallery API.
//!
//! ## Structure
//! - **Gallery**
//!   - `GET  /api/gallery?prefix=`: folders, files and thumbnails under a prefix
//!   - `GET  /api/objects/{*key}?versionId=`: display payload of one object
//!   - `GET  /api/info/{*key}`: metadata and version history
//!
//! - **Profiles & preferences**
//!   - `GET  /api/profiles`: saved bucket profiles
//!   - `PUT  /api/profiles/{alias}`: save a profile
//!   - `POST /api/profiles/{alias}/activate`: switch the active bucket
//!   - `GET|PUT /api/preferences`: display preferences kept in cookies
//!
//! - **Signed downloads**
//!   - `GET  /raw/{bucket}/{*key}?expires=&signature=`
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::handlers::{
    AppState,
    gallery_handlers::{gallery, object_info, object_payload},
    health_handlers::{healthz, readyz},
    profile_handlers::{
        activate_profile, get_preferences, list_profiles, put_preferences, save_profile,
    },
    raw_handlers::get_raw_object,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router; handlers share [`AppState`].
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/gallery", get(gallery))
        .route("/api/objects/{*key}", get(object_payload))
        .route("/api/info/{*key}", get(object_info))
        .route("/api/profiles", get(list_profiles))
        .route("/api/profiles/{alias}", put(save_profile))
        .route("/api/profiles/{alias}/activate", post(activate_profile))
        .route("/api/preferences", get(get_preferences).put(put_preferences))
        .route("/raw/{bucket}/{*key}", get(get_raw_object))
}

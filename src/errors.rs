use crate::services::gallery_service::GalleryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<GalleryError> for AppError {
    fn from(err: GalleryError) -> Self {
        match &err {
            GalleryError::RemoteUnavailable(_) => {
                tracing::error!("{}", err);
                AppError::new(
                    StatusCode::BAD_GATEWAY,
                    format!(
                        "{}. Check your network connection and that the bucket allows GET and HEAD requests from this origin.",
                        err
                    ),
                )
            }
            GalleryError::PartialListing(_) => {
                tracing::error!("{}", err);
                AppError::new(StatusCode::BAD_GATEWAY, err.to_string())
            }
            GalleryError::NotFound(_) | GalleryError::ProfileNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            GalleryError::NoActiveBucket | GalleryError::Superseded(_) => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            GalleryError::CacheUnavailable => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            GalleryError::Store(_) => {
                tracing::error!("{}", err);
                AppError::internal(err.to_string())
            }
        }
    }
}

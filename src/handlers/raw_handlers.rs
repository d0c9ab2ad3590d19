//! Streams object bytes behind time-limited signed URLs.

use crate::{
    errors::AppError,
    handlers::AppState,
    services::{media::mime_for_key, remote::RemoteError},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
    #[serde(rename = "versionId")]
    pub version_id: Option<String>,
}

/// `GET /raw/{bucket}/{*key}?expires=&signature=`
pub async fn get_raw_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<SignedQuery>,
) -> Result<Response, AppError> {
    let valid = state.files.signer().verify(
        &bucket,
        &key,
        query.version_id.as_deref(),
        query.expires,
        &query.signature,
        Utc::now(),
    );
    if !valid {
        return Err(AppError::forbidden("signature is invalid or has expired"));
    }

    let (size, file) = state
        .files
        .open_object(&bucket, &key)
        .await
        .map_err(|err| match err {
            RemoteError::Unavailable(msg) => AppError::internal(msg),
            other => AppError::not_found(other.to_string()),
        })?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(mime_for_key(&key)),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
    Ok(response)
}

//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the cache database and the buckets root

use crate::handlers::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness only; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs `SELECT 1` against the cache database when one is open, and a
/// write/read/delete of a temp file under the buckets root. A missing cache
/// is reported but does not fail readiness: the gallery still serves
/// uncached views. Returns 503 when a probe fails.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite_check = match state.gallery.cache_store() {
        Some(store) => match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*store.db)
            .await
        {
            Ok(1) => CheckStatus::ok(),
            Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
            Err(e) => CheckStatus::failed(format!("error: {}", e)),
        },
        None => CheckStatus {
            ok: true,
            error: Some("cache disabled".into()),
        },
    };

    let disk_check = probe_disk(&state.files.root).await;

    let overall_ok = sqlite_check.ok && disk_check.ok;
    let mut checks = HashMap::new();
    checks.insert("sqlite", sqlite_check);
    checks.insert("disk", disk_check);

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn probe_disk(root: &Path) -> CheckStatus {
    let tmp_path = root.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp_path, b"readyz").await {
        return CheckStatus::failed(format!("could not write tmp file: {}", e));
    }
    let read = fs::read(&tmp_path).await;
    let removed = fs::remove_file(&tmp_path).await;
    match (read, removed) {
        (Ok(bytes), _) if bytes != b"readyz" => CheckStatus::failed("file content mismatch".into()),
        (Ok(_), Ok(())) => CheckStatus::ok(),
        (Ok(_), Err(e)) => CheckStatus {
            ok: true,
            error: Some(format!("could not remove tmp file: {}", e)),
        },
        (Err(e), _) => CheckStatus::failed(format!("could not read tmp file: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}

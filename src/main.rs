use anyhow::{Context, Result};
use axum::Router;
use chrono::{TimeDelta, Utc};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use handlers::AppState;
use models::profile::BucketProfile;
use services::{
    cache_store::LocalCacheStore,
    directory_store::{DirectoryConnector, DirectoryObjectStore},
    gallery_service::GalleryService,
    url_signer::UrlSigner,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + start-up flags ---
    let (cfg, flags) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-gallery with config: {:?}", cfg);

    // --- Ensure buckets directory exists ---
    if !Path::new(&cfg.buckets_root).exists() {
        fs::create_dir_all(&cfg.buckets_root)?;
        tracing::info!("Created buckets directory at {}", cfg.buckets_root);
    }

    // --- Open the local cache ---
    let cache = match open_cache(&cfg.database_url).await {
        Ok(store) => Some(store),
        Err(err) if flags.migrate => return Err(err),
        Err(err) => {
            tracing::warn!("Cache unavailable, serving uncached views: {:#}", err);
            None
        }
    };

    // --- Handle migration mode ---
    if let (true, Some(store)) = (flags.migrate, &cache) {
        tracing::info!(
            "Database migration complete (schema version {}).",
            store.schema_version().await?
        );
        return Ok(()); // exit after migration
    }

    if let (true, Some(store)) = (flags.purge_expired, &cache) {
        let purged = store.purge_expired(Utc::now()).await?;
        tracing::info!("Purged {} expired cache entries", purged);
    }

    // --- Initialize core services ---
    let signer = UrlSigner::new(cfg.signing_secret.clone(), cfg.public_url.clone());
    let files = DirectoryObjectStore::new(&cfg.buckets_root, cfg.page_size, signer);
    let cache_ttl = i64::try_from(cfg.cache_ttl_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .context("cache_ttl_secs is out of range")?;
    let gallery = Arc::new(GalleryService::new(
        cache,
        Arc::new(DirectoryConnector::new(files.clone())),
        cache_ttl,
        cfg.signed_url_expiry_secs,
    ));

    let ad_hoc = cfg
        .bucket
        .as_ref()
        .map(|bucket| BucketProfile::ad_hoc(bucket.clone(), cfg.region.clone()));
    match gallery.restore(cfg.profile.as_deref(), ad_hoc).await {
        Ok(Some(session)) => tracing::info!("Serving bucket `{}`", session.bucket()),
        Ok(None) => tracing::info!("No bucket selected; save and activate a profile to begin"),
        Err(err) => tracing::warn!("Could not open start-up bucket: {}", err),
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(AppState { gallery, files });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the cache database, creating its parent directory first.
async fn open_cache(db_url: &str) -> Result<LocalCacheStore> {
    ensure_database_dir(db_url)
        .with_context(|| format!("creating directory for {}", db_url))?;
    Ok(LocalCacheStore::open(db_url).await?)
}

/// Create the parent directory of a file-backed SQLite URL.
fn ensure_database_dir(db_url: &str) -> Result<()> {
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();
    if db_path.is_empty() || db_path.starts_with(":memory:") {
        return Ok(());
    }
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    Ok(())
}

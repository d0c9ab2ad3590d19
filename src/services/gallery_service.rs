//! src/services/gallery_service.rs
//!
//! GalleryService: orchestrates a gallery view: lists a prefix through the
//! active bucket session, resolves each image through the local cache and,
//! on a miss, downloads it, reconciles the result into the cache and serves
//! the fresh payload. Cache failures are logged and treated as misses; remote
//! failures end the current view.

use crate::{
    models::{
        cache_entry::{CacheKey, Dimensions},
        object::{ListedObject, ObjectVersion, versions_of},
        profile::BucketProfile,
    },
    services::{
        cache_store::{LocalCacheStore, StoreError},
        listing::{ListingError, fetch_all_objects},
        media::{encode_payload, is_image_key},
        reconciler::{Download, reconcile},
        remote::{ObjectStore, ObjectStoreConnector, RemoteError},
        resolver::{CacheEntryResolver, ResolvedPayload},
    },
};
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const FILE_ICON: &str = "assets/file_icon.svg";
const DISPLAY_NAME_MAX_CHARS: usize = 20;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("object store unavailable: {0}")]
    RemoteUnavailable(String),
    #[error(transparent)]
    PartialListing(#[from] ListingError),
    #[error("{0}")]
    NotFound(String),
    #[error("no bucket profile is active")]
    NoActiveBucket,
    #[error("bucket profile `{0}` not found")]
    ProfileNotFound(String),
    #[error("navigation to `{0}` was superseded by a newer one")]
    Superseded(String),
    #[error("local cache store is unavailable")]
    CacheUnavailable,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RemoteError> for GalleryError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unavailable(msg) => GalleryError::RemoteUnavailable(msg),
            other => GalleryError::NotFound(other.to_string()),
        }
    }
}

pub type GalleryResult<T> = Result<T, GalleryError>;

/// Connection state for one activated bucket profile.
///
/// Built once per profile switch; the versioning status is fixed for the
/// lifetime of the session.
pub struct GallerySession {
    pub profile: BucketProfile,
    pub versioning_enabled: bool,
    pub store: Arc<dyn ObjectStore>,
}

impl GallerySession {
    pub async fn establish(
        profile: BucketProfile,
        connector: &dyn ObjectStoreConnector,
    ) -> GalleryResult<Self> {
        let store = connector.connect(&profile)?;
        let versioning_enabled = store.versioning_enabled(&profile.bucket_name).await?;
        Ok(Self {
            profile,
            versioning_enabled,
            store,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.profile.bucket_name
    }
}

const MAX_TRACKED_VIEWS: usize = 1024;

/// Latest navigation per client view (a browser tab, say).
///
/// A navigation is superseded only by a newer one from the same view, so
/// concurrent requests from other views never cancel each other. Tickets come
/// from one counter so the oldest views can be forgotten once the table is full.
#[derive(Default)]
pub struct ViewTracker {
    counter: AtomicU64,
    latest: Mutex<HashMap<String, u64>>,
}

impl ViewTracker {
    pub fn begin(&self, view: &str) -> u64 {
        let ticket = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if latest.len() >= MAX_TRACKED_VIEWS && !latest.contains_key(view) {
            if let Some(oldest) = latest
                .iter()
                .min_by_key(|(_, ticket)| **ticket)
                .map(|(view, _)| view.clone())
            {
                latest.remove(&oldest);
            }
        }
        latest.insert(view.to_string(), ticket);
        ticket
    }

    /// False once `view` has started a newer navigation. A view evicted from
    /// the table counts as current.
    pub fn is_current(&self, view: &str, ticket: u64) -> bool {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        latest.get(view).is_none_or(|newest| *newest == ticket)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub prefix: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct GalleryItem {
    pub key: String,
    pub name: String,
    pub display_name: String,
    pub size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub is_image: bool,
    /// Data URL of the cached payload, or an icon path for non-images.
    pub thumbnail: String,
    pub dimensions: Option<Dimensions>,
    pub version_count: usize,
    /// `(N rev)` when versioning is enabled and more than one version exists.
    pub version_label: Option<String>,
    pub url: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct Footer {
    pub folder_count: usize,
    pub file_count: usize,
    pub total_size_bytes: u64,
    pub total_size: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct GalleryView {
    pub bucket: String,
    pub prefix: String,
    pub share_url: String,
    pub versioning_enabled: bool,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub folders: Vec<Folder>,
    pub items: Vec<GalleryItem>,
    pub footer: Footer,
}

#[derive(Serialize, Debug, Clone)]
pub struct VersionInfo {
    pub version_id: String,
    pub is_latest: bool,
    pub last_modified: DateTime<Utc>,
    pub last_modified_display: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size_bytes: u64,
    pub size: String,
    pub content_type: Option<String>,
    pub dimensions: Option<String>,
    pub tags: Option<String>,
    pub metadata: HashMap<String, String>,
    pub url: String,
    pub versions: Vec<VersionInfo>,
}

pub struct GalleryService {
    /// `None` when the cache store could not be opened: every view fetches directly.
    cache: Option<CacheEntryResolver>,
    connector: Arc<dyn ObjectStoreConnector>,
    session: RwLock<Option<Arc<GallerySession>>>,
    views: ViewTracker,
    cache_ttl: TimeDelta,
    signed_url_expiry_secs: u64,
}

impl GalleryService {
    pub fn new(
        cache: Option<LocalCacheStore>,
        connector: Arc<dyn ObjectStoreConnector>,
        cache_ttl: TimeDelta,
        signed_url_expiry_secs: u64,
    ) -> Self {
        Self {
            cache: cache.map(CacheEntryResolver::new),
            connector,
            session: RwLock::new(None),
            views: ViewTracker::default(),
            cache_ttl,
            signed_url_expiry_secs,
        }
    }

    pub fn cache_store(&self) -> Option<&LocalCacheStore> {
        self.cache.as_ref().map(CacheEntryResolver::store)
    }

    fn profiles(&self) -> GalleryResult<&LocalCacheStore> {
        self.cache_store().ok_or(GalleryError::CacheUnavailable)
    }

    pub async fn session(&self) -> GalleryResult<Arc<GallerySession>> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(GalleryError::NoActiveBucket)
    }

    /// Connect to `profile` and make it the active session.
    pub async fn activate(&self, profile: BucketProfile) -> GalleryResult<Arc<GallerySession>> {
        let session = Arc::new(GallerySession::establish(profile, self.connector.as_ref()).await?);
        info!(
            "Activated bucket `{}` as `{}` (versioning {})",
            session.bucket(),
            session.profile.alias,
            if session.versioning_enabled { "enabled" } else { "disabled" }
        );
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    pub async fn activate_alias(&self, alias: &str) -> GalleryResult<Arc<GallerySession>> {
        let profile = self
            .profiles()?
            .get_bucket_profile(alias)
            .await?
            .ok_or_else(|| GalleryError::ProfileNotFound(alias.to_string()))?;
        self.activate(profile).await
    }

    pub async fn save_profile(&self, profile: &BucketProfile) -> GalleryResult<()> {
        self.profiles()?.put_bucket_profile(profile).await?;
        Ok(())
    }

    pub async fn list_profiles(&self) -> GalleryResult<Vec<BucketProfile>> {
        Ok(self.profiles()?.list_bucket_profiles().await?)
    }

    /// Pick the start-up session: the preferred alias, then `fallback`, then
    /// the most recently saved profile. Returns `None` when nothing is known.
    pub async fn restore(
        &self,
        preferred_alias: Option<&str>,
        fallback: Option<BucketProfile>,
    ) -> GalleryResult<Option<Arc<GallerySession>>> {
        if let Some(alias) = preferred_alias {
            match self.activate_alias(alias).await {
                Ok(session) => return Ok(Some(session)),
                Err(err @ (GalleryError::ProfileNotFound(_) | GalleryError::CacheUnavailable)) => {
                    warn!("Cannot restore profile `{}`: {}", alias, err);
                }
                Err(err) => return Err(err),
            }
        }

        if let Some(profile) = fallback {
            return self.activate(profile).await.map(Some);
        }

        let latest = match self.cache_store() {
            Some(store) => store.latest_bucket_profile().await?,
            None => None,
        };
        match latest {
            Some(profile) => self.activate(profile).await.map(Some),
            None => Ok(None),
        }
    }

    /// Build the gallery for `prefix`.
    ///
    /// With a `view` id, fails with `Superseded` when the same view started
    /// another navigation before this one finished, so that view never gets a
    /// stale result. Requests without a view id are never superseded.
    pub async fn gallery(&self, prefix: &str, view: Option<&str>) -> GalleryResult<GalleryView> {
        let ticket = view.map(|v| (v, self.views.begin(v)));
        let superseded = || {
            ticket.is_some_and(|(view, ticket)| !self.views.is_current(view, ticket))
        };
        let session = self.session().await?;

        let listing = fetch_all_objects(
            session.store.as_ref(),
            session.bucket(),
            prefix,
            session.versioning_enabled,
        )
        .await?;
        if superseded() {
            return Err(GalleryError::Superseded(prefix.to_string()));
        }

        let folders: Vec<Folder> = listing
            .common_prefixes
            .iter()
            .map(|p| Folder {
                name: folder_name(p),
                prefix: p.clone(),
            })
            .collect();

        let files: Vec<&ListedObject> = listing
            .objects
            .iter()
            .filter(|o| !o.summary.key.ends_with('/'))
            .collect();
        let total_size_bytes: u64 = files.iter().map(|o| o.summary.size_bytes).sum();

        let items = try_join_all(files.iter().map(|o| self.render_item(&session, o))).await?;
        if superseded() {
            return Err(GalleryError::Superseded(prefix.to_string()));
        }

        Ok(GalleryView {
            bucket: session.bucket().to_string(),
            prefix: prefix.to_string(),
            share_url: share_url(prefix),
            versioning_enabled: session.versioning_enabled,
            breadcrumbs: breadcrumbs(session.bucket(), prefix),
            footer: Footer {
                folder_count: folders.len(),
                file_count: files.len(),
                total_size_bytes,
                total_size: format_bytes(total_size_bytes),
            },
            folders,
            items,
        })
    }

    async fn render_item(
        &self,
        session: &GallerySession,
        object: &ListedObject,
    ) -> GalleryResult<GalleryItem> {
        let key = &object.summary.key;
        let name = key.rsplit('/').next().unwrap_or(key).to_string();
        let is_image = is_image_key(key);
        let latest = object.latest_version_id();
        let url =
            session
                .store
                .signed_url(session.bucket(), key, latest, self.signed_url_expiry_secs)?;

        let (thumbnail, dimensions, version_count) = if is_image {
            let resolved = self
                .display_payload(session, key, latest, object.versions.as_deref())
                .await?;
            (
                resolved.payload.data_url,
                resolved.payload.dimensions,
                resolved.version_count,
            )
        } else {
            let count = object.versions.as_ref().map_or(1, Vec::len);
            (FILE_ICON.to_string(), None, count)
        };

        let version_label = (session.versioning_enabled && version_count > 1)
            .then(|| format!("({} rev)", version_count));

        Ok(GalleryItem {
            key: key.clone(),
            display_name: truncate_name(&name),
            name,
            size_bytes: object.summary.size_bytes,
            last_modified: object.summary.last_modified,
            is_image,
            thumbnail,
            dimensions,
            version_count,
            version_label,
            url,
        })
    }

    /// Payload for one object, a specific version when `version_id` is given.
    ///
    /// On a versioned bucket without `version_id`, the latest version id is
    /// looked up first so the cache is asked for exactly that version.
    pub async fn object_payload(
        &self,
        key: &str,
        version_id: Option<&str>,
    ) -> GalleryResult<ResolvedPayload> {
        let session = self.session().await?;
        if !session.versioning_enabled || version_id.is_some() {
            return self.display_payload(&session, key, version_id, None).await;
        }

        let versions = self.versions_for(&session, key).await?;
        let latest = versions
            .iter()
            .find(|v| v.is_latest)
            .map(|v| v.version_id.clone());
        self.display_payload(&session, key, latest.as_deref(), Some(&versions))
            .await
    }

    /// Head metadata, dimensions and version history for the info panel.
    pub async fn object_info(&self, key: &str) -> GalleryResult<ObjectInfo> {
        let session = self.session().await?;
        let head = session.store.head_object(session.bucket(), key).await?;

        let versions = if session.versioning_enabled {
            self.versions_for(&session, key).await?
        } else {
            Vec::new()
        };
        let latest = versions
            .iter()
            .find(|v| v.is_latest)
            .map(|v| v.version_id.as_str());

        let dimensions = if is_image_key(key) {
            let known = session.versioning_enabled.then_some(versions.as_slice());
            self.display_payload(&session, key, latest, known)
                .await?
                .payload
                .dimensions
                .map(|d| format!("{}x{}", d.width, d.height))
        } else {
            None
        };

        let url = session
            .store
            .signed_url(session.bucket(), key, latest, self.signed_url_expiry_secs)?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size_bytes: head.content_length,
            size: format_bytes(head.content_length),
            content_type: head.content_type,
            dimensions,
            tags: head.metadata.get("tags").cloned(),
            metadata: head.metadata,
            url,
            versions: versions
                .into_iter()
                .map(|v| VersionInfo {
                    last_modified_display: format_last_modified(v.last_modified),
                    version_id: v.version_id,
                    is_latest: v.is_latest,
                    last_modified: v.last_modified,
                })
                .collect(),
        })
    }

    async fn versions_for(
        &self,
        session: &GallerySession,
        key: &str,
    ) -> GalleryResult<Vec<ObjectVersion>> {
        let listed = session.store.list_versions(session.bucket(), key).await?;
        Ok(versions_of(key, listed))
    }

    /// Resolve through the cache, falling back to a download that is then
    /// reconciled into the cache. `known_versions` is the object's version
    /// listing when the caller already has it.
    async fn display_payload(
        &self,
        session: &GallerySession,
        key: &str,
        version_id: Option<&str>,
        known_versions: Option<&[ObjectVersion]>,
    ) -> GalleryResult<ResolvedPayload> {
        let cache_key = CacheKey::new(session.bucket(), key);
        let now = Utc::now();

        if let Some(resolver) = &self.cache {
            match resolver
                .resolve(&cache_key, session.versioning_enabled, version_id, now)
                .await
            {
                Ok(Some(hit)) => return Ok(hit),
                Ok(None) => {}
                Err(err) => warn!("cache read for {} failed, fetching directly: {}", cache_key, err),
            }
        }

        let bytes = session
            .store
            .get_object(session.bucket(), key, version_id)
            .await?;
        let payload = encode_payload(key, &bytes);
        debug!("downloaded {} ({} bytes)", cache_key, bytes.len());

        let fresh_versions: Vec<String> = if session.versioning_enabled {
            match known_versions {
                Some(versions) => versions.iter().map(|v| v.version_id.clone()).collect(),
                None => self
                    .versions_for(session, key)
                    .await?
                    .into_iter()
                    .map(|v| v.version_id)
                    .collect(),
            }
        } else {
            Vec::new()
        };

        let mut version_count = if session.versioning_enabled {
            fresh_versions.len().max(1)
        } else {
            1
        };

        if let Some(resolver) = &self.cache {
            let existing = match resolver.fresh_entry(&cache_key, now).await {
                Ok(existing) => existing,
                Err(err) => {
                    warn!("cache read for {} failed before merge: {}", cache_key, err);
                    None
                }
            };
            let entry = reconcile(
                existing,
                &cache_key,
                Download {
                    fresh_versions: &fresh_versions,
                    version_id,
                    payload: payload.clone(),
                },
                session.versioning_enabled,
                self.cache_ttl,
                now,
            );
            version_count = entry.version_count();
            if let Err(err) = resolver.store().put(&entry).await {
                warn!("cache write for {} failed: {}", cache_key, err);
            }
        }

        Ok(ResolvedPayload {
            payload,
            version_count,
            version_id: version_id.map(str::to_string),
            // Without a version id the store served whatever it considers latest.
            exact: version_id.is_some() || !session.versioning_enabled,
        })
    }
}

fn folder_name(prefix: &str) -> String {
    prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(prefix)
        .to_string()
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > DISPLAY_NAME_MAX_CHARS {
        let head: String = name.chars().take(DISPLAY_NAME_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        name.to_string()
    }
}

/// Query string that reopens the gallery at `prefix`.
pub fn share_url(prefix: &str) -> String {
    format!("?prefix={}", urlencoding::encode(prefix))
}

/// Bucket root followed by one crumb per path fragment of `prefix`.
pub fn breadcrumbs(bucket: &str, prefix: &str) -> Vec<Breadcrumb> {
    let fragments: Vec<&str> = prefix.split('/').filter(|f| !f.is_empty()).collect();
    let mut crumbs = vec![Breadcrumb {
        name: bucket.to_string(),
        path: String::new(),
    }];
    for (index, fragment) in fragments.iter().enumerate() {
        crumbs.push(Breadcrumb {
            name: fragment.to_string(),
            path: format!("{}/", fragments[..=index].join("/")),
        });
    }
    crumbs
}

/// Human-readable size with up to two decimals, e.g. `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

pub fn format_last_modified(at: DateTime<Utc>) -> String {
    at.format("%m/%d/%Y %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            cache_entry::{CacheBody, CacheEntry},
            object::ListPage,
        },
        services::{
            cache_store::tests::{blank_store, test_store},
            listing::tests::{FakeStore, summary, version},
            media::tests::png_header,
            remote::RemoteResult,
        },
    };
    use std::time::Duration;

    struct FakeConnector(Arc<FakeStore>);

    impl ObjectStoreConnector for FakeConnector {
        fn connect(&self, _profile: &BucketProfile) -> RemoteResult<Arc<dyn ObjectStore>> {
            let store: Arc<dyn ObjectStore> = self.0.clone();
            Ok(store)
        }
    }

    fn profile(alias: &str) -> BucketProfile {
        BucketProfile::ad_hoc(alias, "us-east-1")
    }

    fn single_page(keys: &[(&str, u64)], prefixes: &[&str]) -> Vec<ListPage> {
        vec![ListPage {
            entries: keys.iter().map(|(k, s)| summary(k, *s)).collect(),
            common_prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            is_truncated: false,
            next_marker: None,
        }]
    }

    fn content(key: &str, version: Option<&str>, bytes: Vec<u8>) -> ((String, Option<String>), Vec<u8>) {
        ((key.to_string(), version.map(str::to_string)), bytes)
    }

    async fn service(store: FakeStore, cache: Option<LocalCacheStore>) -> (GalleryService, Arc<FakeStore>) {
        let store = Arc::new(store);
        let service = GalleryService::new(
            cache,
            Arc::new(FakeConnector(store.clone())),
            TimeDelta::hours(24),
            300,
        );
        service.activate(profile("photos")).await.unwrap();
        (service, store)
    }

    fn unversioned_store() -> FakeStore {
        FakeStore {
            pages: single_page(&[("a.png", 10), ("notes.txt", 5), ("dir/", 0)], &["2024/"]),
            contents: [
                content("a.png", None, png_header(10, 10)),
                content("notes.txt", None, b"hello".to_vec()),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn gallery_caches_images_between_views() {
        let (service, store) = service(unversioned_store(), Some(test_store().await)).await;

        let first = service.gallery("", None).await.unwrap();
        assert_eq!(first.footer.folder_count, 1);
        assert_eq!(first.footer.file_count, 2);
        assert_eq!(first.footer.total_size, "15 Bytes");
        assert_eq!(first.folders[0].name, "2024");
        assert_eq!(first.items.len(), 2);

        let image = &first.items[0];
        assert!(image.is_image);
        assert!(image.thumbnail.starts_with("data:image/png;base64,"));
        assert_eq!(image.version_count, 1);
        assert_eq!(image.version_label, None);
        assert_eq!(first.items[1].thumbnail, FILE_ICON);
        assert_eq!(store.download_count(), 1);

        let second = service.gallery("", None).await.unwrap();
        assert_eq!(second.items[0].thumbnail, image.thumbnail);
        assert_eq!(store.download_count(), 1);
    }

    #[tokio::test]
    async fn gallery_without_cache_downloads_every_time() {
        let (service, store) = service(unversioned_store(), None).await;
        service.gallery("", None).await.unwrap();
        service.gallery("", None).await.unwrap();
        assert_eq!(store.download_count(), 2);
        assert!(matches!(
            service.list_profiles().await,
            Err(GalleryError::CacheUnavailable)
        ));
    }

    #[tokio::test]
    async fn broken_cache_falls_back_to_remote() {
        // No schema: every cache read and write fails.
        let (service, store) = service(unversioned_store(), Some(blank_store().await)).await;
        let view = service.gallery("", None).await.unwrap();
        assert!(view.items[0].thumbnail.starts_with("data:image/png"));
        assert_eq!(store.download_count(), 1);
    }

    #[tokio::test]
    async fn remote_failure_on_miss_fails_the_view() {
        let mut store = unversioned_store();
        store.fail_downloads = true;
        let (service, _) = service(store, Some(test_store().await)).await;
        assert!(matches!(
            service.gallery("", None).await,
            Err(GalleryError::RemoteUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn gallery_requires_active_session() {
        let service = GalleryService::new(
            None,
            Arc::new(FakeConnector(Arc::new(FakeStore::default()))),
            TimeDelta::hours(1),
            300,
        );
        assert!(matches!(
            service.gallery("", None).await,
            Err(GalleryError::NoActiveBucket)
        ));
    }

    fn versioned_store() -> FakeStore {
        let mut versions = HashMap::new();
        versions.insert(
            "a.png".to_string(),
            vec![version("a.png", "v2", true), version("a.png", "v1", false)],
        );
        FakeStore {
            pages: single_page(&[("a.png", 10)], &[]),
            versions,
            contents: [
                content("a.png", Some("v2"), png_header(20, 10)),
                content("a.png", Some("v1"), png_header(5, 5)),
            ]
            .into_iter()
            .collect(),
            versioning: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn versioned_gallery_caches_latest_and_counts_revisions() {
        let cache = test_store().await;
        let (service, store) = service(versioned_store(), Some(cache.clone())).await;

        let view = service.gallery("", None).await.unwrap();
        let item = &view.items[0];
        assert_eq!(item.version_count, 2);
        assert_eq!(item.version_label.as_deref(), Some("(2 rev)"));
        assert_eq!(
            item.dimensions,
            Some(Dimensions {
                width: 20,
                height: 10
            })
        );
        assert_eq!(
            store.downloads.lock().unwrap().as_slice(),
            &[("a.png".to_string(), Some("v2".to_string()))]
        );

        let entry = cache.get("photos/a.png").await.unwrap().unwrap();
        let CacheBody::Versioned { versions } = entry.body else {
            panic!("expected versioned entry");
        };
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].version_id, "v2");
        assert!(versions[0].payload.is_some());
        assert!(versions[1].payload.is_none());

        // Older version is fetched once, then served from cache; v2 stays cached.
        let old = service.object_payload("a.png", Some("v1")).await.unwrap();
        assert_eq!(old.payload.dimensions.unwrap().width, 5);
        service.object_payload("a.png", Some("v1")).await.unwrap();
        let latest = service.object_payload("a.png", None).await.unwrap();
        assert_eq!(latest.version_id.as_deref(), Some("v2"));
        assert_eq!(store.download_count(), 2);
    }

    #[tokio::test]
    async fn stale_entry_is_refetched_and_overwritten() {
        let cache = test_store().await;
        let (service, store) = service(unversioned_store(), Some(cache.clone())).await;

        cache
            .put(&CacheEntry {
                key: "photos/a.png".into(),
                expires_at: Utc::now() - TimeDelta::minutes(1),
                body: CacheBody::Unversioned {
                    payload: encode_payload("a.png", b"old"),
                },
            })
            .await
            .unwrap();

        let payload = service.object_payload("a.png", None).await.unwrap();
        assert_eq!(payload.payload.dimensions.unwrap().width, 10);
        assert_eq!(store.download_count(), 1);
        let entry = cache.get("photos/a.png").await.unwrap().unwrap();
        assert!(!entry.is_stale(Utc::now()));
    }

    #[tokio::test]
    async fn object_info_reports_versions_and_dimensions() {
        let mut store = versioned_store();
        store
            .contents
            .insert(("a.png".to_string(), None), png_header(20, 10));
        let (service, _) = service(store, Some(test_store().await)).await;

        let info = service.object_info("a.png").await.unwrap();
        assert_eq!(info.size_bytes, 29);
        assert_eq!(info.dimensions.as_deref(), Some("20x10"));
        assert_eq!(info.tags.as_deref(), Some("holiday"));
        assert_eq!(info.versions.len(), 2);
        assert!(info.versions[0].is_latest);
    }

    #[tokio::test]
    async fn profiles_are_saved_and_restored() {
        let cache = test_store().await;
        let store = Arc::new(unversioned_store());
        let service = GalleryService::new(
            Some(cache),
            Arc::new(FakeConnector(store)),
            TimeDelta::hours(1),
            300,
        );

        assert!(service.restore(None, None).await.unwrap().is_none());

        service.save_profile(&profile("first")).await.unwrap();
        service.save_profile(&profile("second")).await.unwrap();
        assert_eq!(service.list_profiles().await.unwrap().len(), 2);

        let by_alias = service.restore(Some("first"), None).await.unwrap().unwrap();
        assert_eq!(by_alias.profile.alias, "first");

        let latest = service.restore(Some("missing"), None).await.unwrap().unwrap();
        assert_eq!(latest.profile.alias, "second");

        let ad_hoc = service
            .restore(None, Some(profile("adhoc")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(service.session().await.unwrap().profile.alias, ad_hoc.profile.alias);

        assert!(matches!(
            service.activate_alias("nope").await,
            Err(GalleryError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn newer_navigation_supersedes_older_in_the_same_view() {
        let views = ViewTracker::default();
        let first = views.begin("tab-1");
        assert!(views.is_current("tab-1", first));
        let other = views.begin("tab-2");
        assert!(views.is_current("tab-1", first));
        let second = views.begin("tab-1");
        assert!(!views.is_current("tab-1", first));
        assert!(views.is_current("tab-1", second));
        assert!(views.is_current("tab-2", other));
    }

    #[test]
    fn view_table_forgets_oldest_views() {
        let views = ViewTracker::default();
        let oldest = views.begin("tab-0");
        for n in 1..=MAX_TRACKED_VIEWS {
            views.begin(&format!("tab-{}", n));
        }
        assert_eq!(views.latest.lock().unwrap().len(), MAX_TRACKED_VIEWS);
        assert!(views.is_current("tab-0", oldest));
    }

    fn slow_store() -> FakeStore {
        let mut store = unversioned_store();
        store
            .list_delays
            .insert("slow/".to_string(), Duration::from_millis(200));
        store
    }

    #[tokio::test]
    async fn concurrent_views_do_not_supersede_each_other() {
        let (service, _) = service(slow_store(), Some(test_store().await)).await;

        let (slow, fast) = tokio::join!(service.gallery("slow/", Some("tab-a")), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            service.gallery("other/", Some("tab-b")).await
        });
        assert!(slow.is_ok());
        assert!(fast.is_ok());
    }

    #[tokio::test]
    async fn newer_navigation_in_same_view_discards_older_result() {
        let (service, _) = service(slow_store(), Some(test_store().await)).await;

        let (slow, fast) = tokio::join!(service.gallery("slow/", Some("tab-a")), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            service.gallery("other/", Some("tab-a")).await
        });
        assert!(matches!(slow, Err(GalleryError::Superseded(prefix)) if prefix == "slow/"));
        assert_eq!(fast.unwrap().prefix, "other/");
    }

    #[tokio::test]
    async fn download_without_version_id_is_not_exact_on_versioned_bucket() {
        let mut store = versioned_store();
        store
            .contents
            .insert(("b.png".to_string(), None), png_header(2, 2));
        let (service, _) = service(store, None).await;
        let session = service.session().await.unwrap();

        let payload = service
            .display_payload(&session, "b.png", None, Some(&[][..]))
            .await
            .unwrap();
        assert!(!payload.exact);
        assert_eq!(payload.version_id, None);
    }

    #[test]
    fn formats_sizes_like_the_footer() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
    }

    #[test]
    fn breadcrumbs_and_share_url() {
        let crumbs = breadcrumbs("photos", "2024/summer/");
        let paths: Vec<_> = crumbs.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["", "2024/", "2024/summer/"]);
        assert_eq!(crumbs[0].name, "photos");
        assert_eq!(share_url("2024/a b/"), "?prefix=2024%2Fa%20b%2F");
    }

    #[test]
    fn long_names_are_truncated() {
        assert_eq!(truncate_name("short.png"), "short.png");
        assert_eq!(
            truncate_name("a-very-long-file-name-indeed.png"),
            "a-very-long-file-nam..."
        );
    }
}

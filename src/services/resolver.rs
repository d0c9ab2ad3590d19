//! Decides whether a usable cached payload exists for an object.

use crate::{
    models::cache_entry::{CacheBody, CacheEntry, CacheKey, PayloadRecord},
    services::cache_store::{LocalCacheStore, StoreResult},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

/// A cache hit.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPayload {
    #[serde(flatten)]
    pub payload: PayloadRecord,

    /// Versions known for the object; 1 for unversioned entries.
    pub version_count: usize,

    /// Version the payload belongs to, `None` for unversioned entries.
    pub version_id: Option<String>,

    /// False when no version was requested and the payload is simply the first
    /// cached one, which may not be the latest.
    pub exact: bool,
}

#[derive(Clone)]
pub struct CacheEntryResolver {
    store: LocalCacheStore,
}

impl CacheEntryResolver {
    pub fn new(store: LocalCacheStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &LocalCacheStore {
        &self.store
    }

    /// Look up `key` and resolve it against `now`.
    ///
    /// Misses of any kind return `Ok(None)`; only a failing store read is an error.
    pub async fn resolve(
        &self,
        key: &CacheKey,
        versioning_enabled: bool,
        requested_version: Option<&str>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<ResolvedPayload>> {
        let entry = self.store.get(key.as_str()).await?;
        let resolved = entry
            .as_ref()
            .and_then(|e| resolve_entry(e, versioning_enabled, requested_version, now));
        debug!(
            "cache {} for {} (version {:?})",
            if resolved.is_some() { "hit" } else { "miss" },
            key,
            requested_version
        );
        Ok(resolved)
    }

    /// The stored entry for `key` if it has not expired.
    pub async fn fresh_entry(
        &self,
        key: &CacheKey,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<CacheEntry>> {
        Ok(self
            .store
            .get(key.as_str())
            .await?
            .filter(|entry| !entry.is_stale(now)))
    }
}

/// Resolve a payload from an already loaded entry.
///
/// A stale entry, an entry whose shape does not match `versioning_enabled`,
/// a requested version that is unknown or not yet downloaded all resolve to
/// `None`. Without a requested version the first record holding a payload
/// is returned, in stored order.
pub fn resolve_entry(
    entry: &CacheEntry,
    versioning_enabled: bool,
    requested_version: Option<&str>,
    now: DateTime<Utc>,
) -> Option<ResolvedPayload> {
    if entry.is_stale(now) {
        return None;
    }
    if entry.body.is_versioned() != versioning_enabled {
        debug!(
            "{} is cached {}versioned; bucket versioning is now {}",
            entry.key,
            if entry.body.is_versioned() { "" } else { "un" },
            if versioning_enabled { "on" } else { "off" }
        );
        return None;
    }

    match (&entry.body, versioning_enabled) {
        (CacheBody::Unversioned { payload }, false) => Some(ResolvedPayload {
            payload: payload.clone(),
            version_count: 1,
            version_id: None,
            exact: true,
        }),
        (CacheBody::Versioned { versions }, true) => {
            let record = match requested_version {
                Some(id) => versions.iter().find(|v| v.version_id == id)?,
                None => versions.iter().find(|v| v.payload.is_some())?,
            };
            let payload = record.payload.clone()?;
            Some(ResolvedPayload {
                payload,
                version_count: versions.len(),
                version_id: Some(record.version_id.clone()),
                exact: requested_version.is_some(),
            })
        }
        _ => None,
    }
}

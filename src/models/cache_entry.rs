//! Records persisted in the `images` namespace of the local cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bucket-qualified object identity used as the primary key of a cache entry.
///
/// Rendered as `{bucket}/{key}` so that two buckets holding the same object
/// path never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(bucket: &str, object_key: &str) -> Self {
        Self(format!("{}/{}", bucket, object_key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pixel dimensions of a raster payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Downloaded object content, self-contained for offline reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadRecord {
    /// `data:{mime};base64,...` encoding of the object bytes.
    pub data_url: String,

    /// Present only when the payload is a raster image with a readable header.
    pub dimensions: Option<Dimensions>,
}

/// One known version of an object. `payload` is `None` until its bytes are fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version_id: String,
    pub payload: Option<PayloadRecord>,
}

impl VersionRecord {
    pub fn placeholder(version_id: impl Into<String>) -> Self {
        Self {
            version_id: version_id.into(),
            payload: None,
        }
    }
}

/// Shape of a cache entry, fixed by the bucket's versioning mode at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CacheBody {
    /// Versions in discovery order; at most one record per `version_id`.
    Versioned { versions: Vec<VersionRecord> },
    Unversioned { payload: PayloadRecord },
}

impl CacheBody {
    pub fn is_versioned(&self) -> bool {
        matches!(self, CacheBody::Versioned { .. })
    }
}

/// A cached object. `expires_at` covers the whole entry, never single versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub expires_at: DateTime<Utc>,
    pub body: CacheBody,
}

impl CacheEntry {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Number of versions the entry knows about; unversioned entries count as one.
    pub fn version_count(&self) -> usize {
        match &self.body {
            CacheBody::Versioned { versions } => versions.len(),
            CacheBody::Unversioned { .. } => 1,
        }
    }
}

//! Objects, versions and listing pages as reported by the remote store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// A single object returned by a listing.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Size in bytes.
    pub size_bytes: u64,

    /// Timestamp when object was last modified.
    pub last_modified: DateTime<Utc>,

    pub etag: Option<String>,
}

/// One historical revision of an object key.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub last_modified: DateTime<Utc>,
}

/// Result of a HEAD request.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_length: u64,
    pub content_type: Option<String>,

    /// User-defined metadata (e.g. `tags`).
    pub metadata: HashMap<String, String>,
}

/// One page of a delimiter-based listing.
#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub entries: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

/// A listed object paired with its version history when versioning is enabled.
#[derive(Serialize, Clone, Debug)]
pub struct ListedObject {
    #[serde(flatten)]
    pub summary: ObjectSummary,
    pub versions: Option<Vec<ObjectVersion>>,
}

impl ListedObject {
    pub fn unversioned(summary: ObjectSummary) -> Self {
        Self {
            summary,
            versions: None,
        }
    }

    /// Id of the version flagged as latest, if the listing reported one.
    pub fn latest_version_id(&self) -> Option<&str> {
        self.versions
            .as_deref()?
            .iter()
            .find(|v| v.is_latest)
            .map(|v| v.version_id.as_str())
    }
}

/// All pages of a prefix listing merged in the order they were returned.
#[derive(Serialize, Clone, Debug, Default)]
pub struct Listing {
    pub common_prefixes: Vec<String>,
    pub objects: Vec<ListedObject>,
}

/// Validate a prefix-based version listing for one object.
///
/// Version listings match by key prefix, so `a.png` also returns the history
/// of `a.png.bak`. Only versions of exactly `key` are kept.
pub fn versions_of(key: &str, listed: Vec<ObjectVersion>) -> Vec<ObjectVersion> {
    listed.into_iter().filter(|v| v.key == key).collect()
}

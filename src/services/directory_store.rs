//! src/services/directory_store.rs
//!
//! DirectoryObjectStore: an `ObjectStore` over a local directory tree. Each
//! sub-directory of `root` is a bucket and every regular file beneath it is
//! an object whose key is its relative path. Listings follow the marker-based
//! delimiter rules of S3 ListObjects (v1). The backend keeps no history, so
//! buckets always report versioning as disabled.

use crate::{
    models::{
        object::{ListPage, ObjectHead, ObjectSummary, ObjectVersion},
        profile::BucketProfile,
    },
    services::{
        media::mime_for_key,
        remote::{ObjectStore, ObjectStoreConnector, RemoteError, RemoteResult},
        url_signer::UrlSigner,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::{BTreeMap, HashMap},
    io,
    path::PathBuf,
    sync::Arc,
};
use tokio::fs::{self, File};
use tracing::debug;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

#[derive(Clone)]
pub struct DirectoryObjectStore {
    /// Directory holding one sub-directory per bucket.
    pub root: PathBuf,

    /// Maximum keys plus common prefixes returned per listing page.
    pub page_size: usize,

    signer: UrlSigner,
}

impl DirectoryObjectStore {
    pub fn new(root: impl Into<PathBuf>, page_size: usize, signer: UrlSigner) -> Self {
        Self {
            root: root.into(),
            page_size: page_size.max(1),
            signer,
        }
    }

    /// Rejects keys that are empty or absolute, keys with a `.` or `..` path
    /// segment, and keys carrying control characters or backslashes.
    fn ensure_key_safe(&self, key: &str) -> RemoteResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.split('/').any(|segment| segment == "." || segment == "..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(RemoteError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    /// Bucket names follow S3 rules: 3–63 characters of lowercase letters,
    /// digits, dots and hyphens, starting and ending alphanumeric, and not
    /// shaped like an IPv4 address.
    fn ensure_bucket_name_safe(&self, name: &str) -> RemoteResult<()> {
        let len = name.len();
        let valid = (BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len)
            && name
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
            && !name.starts_with(['.', '-'])
            && !name.ends_with(['.', '-'])
            && !name.contains("..")
            && !name.contains("-.")
            && !name.contains(".-")
            && !is_ipv4_like(name);
        if !valid {
            return Err(RemoteError::BucketNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn bucket_root(&self, bucket: &str) -> RemoteResult<PathBuf> {
        self.ensure_bucket_name_safe(bucket)?;
        let path = self.root.join(bucket);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(path),
            Ok(_) => Err(RemoteError::BucketNotFound(bucket.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(RemoteError::BucketNotFound(bucket.to_string()))
            }
            Err(err) => Err(io_error(err)),
        }
    }

    async fn object_path(&self, bucket: &str, key: &str) -> RemoteResult<PathBuf> {
        self.ensure_key_safe(key)?;
        let mut path = self.bucket_root(bucket).await?;
        path.extend(key.split('/'));
        Ok(path)
    }

    /// Every object in the bucket, keyed and sorted by object key.
    ///
    /// Hidden entries (names starting with `.`) and non UTF-8 names are skipped.
    async fn scan_bucket(&self, bucket: &str) -> RemoteResult<BTreeMap<String, ObjectSummary>> {
        let bucket_root = self.bucket_root(bucket).await?;
        let mut objects = BTreeMap::new();
        let mut pending = vec![(bucket_root, String::new())];

        while let Some((dir, rel)) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(io_error)?;
            while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    debug!("skipping non UTF-8 entry in {}", dir.display());
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                let key = format!("{}{}", rel, name);
                let file_type = entry.file_type().await.map_err(io_error)?;
                if file_type.is_dir() {
                    pending.push((entry.path(), format!("{}/", key)));
                } else if file_type.is_file() {
                    let meta = entry.metadata().await.map_err(io_error)?;
                    let last_modified = meta
                        .modified()
                        .map(DateTime::<Utc>::from)
                        .unwrap_or_else(|_| Utc::now());
                    objects.insert(
                        key.clone(),
                        ObjectSummary {
                            key,
                            size_bytes: meta.len(),
                            last_modified,
                            etag: None,
                        },
                    );
                }
            }
        }

        Ok(objects)
    }

    /// Open an object for streaming, returning its size and file handle.
    pub async fn open_object(&self, bucket: &str, key: &str) -> RemoteResult<(u64, File)> {
        let path = self.object_path(bucket, key).await?;
        let file = File::open(&path).await.map_err(|err| not_found_or(err, bucket, key))?;
        let meta = file.metadata().await.map_err(io_error)?;
        if !meta.is_file() {
            return Err(RemoteError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok((meta.len(), file))
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    fn reject_version(&self, bucket: &str, key: &str, version_id: Option<&str>) -> RemoteResult<()> {
        match version_id {
            None | Some("null") => Ok(()),
            Some(_) => Err(RemoteError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ObjectStore for DirectoryObjectStore {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
        marker: Option<&str>,
    ) -> RemoteResult<ListPage> {
        let objects = self.scan_bucket(bucket).await?;
        let marker = marker.unwrap_or("");

        let mut page = ListPage::default();
        let mut last_item: Option<String> = None;
        let mut count = 0;

        for (key, summary) in objects.range::<str, _>((
            std::ops::Bound::Excluded(marker),
            std::ops::Bound::Unbounded,
        )) {
            if !key.starts_with(prefix) {
                continue;
            }

            let common = if delimiter.is_empty() {
                None
            } else {
                compute_common_prefix(key, prefix, delimiter)
            };

            if let Some(common) = &common {
                // Keys rolled up into a prefix already returned on this or an earlier page.
                if common.as_str() <= marker || page.common_prefixes.last() == Some(common) {
                    continue;
                }
            }

            if count == self.page_size {
                page.is_truncated = true;
                page.next_marker = last_item;
                return Ok(page);
            }

            match common {
                Some(common) => {
                    last_item = Some(common.clone());
                    page.common_prefixes.push(common);
                }
                None => {
                    last_item = Some(key.clone());
                    page.entries.push(summary.clone());
                }
            }
            count += 1;
        }

        Ok(page)
    }

    async fn list_versions(
        &self,
        bucket: &str,
        _key_prefix: &str,
    ) -> RemoteResult<Vec<ObjectVersion>> {
        self.bucket_root(bucket).await?;
        Ok(Vec::new())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> RemoteResult<ObjectHead> {
        let path = self.object_path(bucket, key).await?;
        let meta = fs::metadata(&path)
            .await
            .map_err(|err| not_found_or(err, bucket, key))?;
        if !meta.is_file() {
            return Err(RemoteError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Ok(ObjectHead {
            content_length: meta.len(),
            content_type: Some(mime_for_key(key).to_string()),
            metadata: HashMap::new(),
        })
    }

    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> RemoteResult<Bytes> {
        self.reject_version(bucket, key, version_id)?;
        let path = self.object_path(bucket, key).await?;
        let data = fs::read(&path)
            .await
            .map_err(|err| not_found_or(err, bucket, key))?;
        Ok(Bytes::from(data))
    }

    fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        expiry_secs: u64,
    ) -> RemoteResult<String> {
        self.ensure_key_safe(key)?;
        self.ensure_bucket_name_safe(bucket)?;
        Ok(self
            .signer
            .sign(bucket, key, version_id, expiry_secs, Utc::now()))
    }

    async fn versioning_enabled(&self, bucket: &str) -> RemoteResult<bool> {
        self.bucket_root(bucket).await?;
        Ok(false)
    }
}

/// Connects every profile to the same directory tree; credentials are not needed locally.
#[derive(Clone)]
pub struct DirectoryConnector {
    store: DirectoryObjectStore,
}

impl DirectoryConnector {
    pub fn new(store: DirectoryObjectStore) -> Self {
        Self { store }
    }
}

impl ObjectStoreConnector for DirectoryConnector {
    fn connect(&self, profile: &BucketProfile) -> RemoteResult<Arc<dyn ObjectStore>> {
        debug!(
            "connecting profile {} to {}",
            profile.alias,
            self.store.root.join(&profile.bucket_name).display()
        );
        Ok(Arc::new(self.store.clone()))
    }
}

fn io_error(err: io::Error) -> RemoteError {
    RemoteError::Unavailable(err.to_string())
}

fn not_found_or(err: io::Error, bucket: &str, key: &str) -> RemoteError {
    if err.kind() == io::ErrorKind::NotFound {
        RemoteError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    } else {
        io_error(err)
    }
}

/// Compute the rolled-up "common prefix" of `key` under `requested_prefix`.
///
/// Returns `Some(prefix)` when the remainder of the key after the requested
/// prefix contains the delimiter, otherwise `None`.
fn compute_common_prefix(key: &str, requested_prefix: &str, delimiter: &str) -> Option<String> {
    let after_prefix = key.strip_prefix(requested_prefix)?;
    let pos = after_prefix.find(delimiter)?;
    let mut combined = String::from(requested_prefix);
    combined.push_str(&after_prefix[..pos + delimiter.len()]);
    Some(combined)
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

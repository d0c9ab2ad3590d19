//! Boundary to the remote object store.

use crate::models::{
    object::{ListPage, ObjectHead, ObjectVersion},
    profile::BucketProfile,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure reaching the store.
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Operations the gallery consumes from an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// One page of a delimiter listing under `prefix`, starting after `marker`.
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
        marker: Option<&str>,
    ) -> RemoteResult<ListPage>;

    /// Versions of every key starting with `key_prefix`, in store order.
    async fn list_versions(&self, bucket: &str, key_prefix: &str)
    -> RemoteResult<Vec<ObjectVersion>>;

    async fn head_object(&self, bucket: &str, key: &str) -> RemoteResult<ObjectHead>;

    /// Download object bytes, the latest version when `version_id` is `None`.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> RemoteResult<Bytes>;

    /// Time-limited URL granting read access to one object.
    fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        expiry_secs: u64,
    ) -> RemoteResult<String>;

    async fn versioning_enabled(&self, bucket: &str) -> RemoteResult<bool>;
}

/// Builds a store client for a bucket profile.
pub trait ObjectStoreConnector: Send + Sync {
    fn connect(&self, profile: &BucketProfile) -> RemoteResult<Arc<dyn ObjectStore>>;
}

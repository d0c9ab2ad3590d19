//! Saved bucket connection profiles (the `buckets` namespace).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// A named connection to a bucket.
///
/// Profiles are created or replaced only by an explicit save and never expire.
#[derive(Serialize, Deserialize, Clone, FromRow, PartialEq, Eq)]
pub struct BucketProfile {
    /// User-chosen name, unique across saved profiles.
    pub alias: String,

    /// Bucket the profile connects to.
    pub bucket_name: String,

    /// Region where the bucket is hosted (e.g. "us-west-2").
    pub region: String,

    pub access_key_id: String,

    pub secret_access_key: String,
}

impl BucketProfile {
    /// Build an unsaved profile from the bucket name alone, aliased by that name.
    pub fn ad_hoc(bucket_name: impl Into<String>, region: impl Into<String>) -> Self {
        let bucket_name = bucket_name.into();
        Self {
            alias: bucket_name.clone(),
            bucket_name,
            region: region.into(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
        }
    }
}

impl fmt::Debug for BucketProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketProfile")
            .field("alias", &self.alias)
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secret() {
        let profile = BucketProfile {
            alias: "home".into(),
            bucket_name: "photos".into(),
            region: "eu-west-1".into(),
            access_key_id: "AKIA".into(),
            secret_access_key: "hunter2".into(),
        };
        let rendered = format!("{:?}", profile);
        assert!(rendered.contains("AKIA"));
        assert!(!rendered.contains("hunter2"));
    }
}

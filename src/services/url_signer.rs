//! Time-limited URLs for the `/raw/{bucket}/{*key}` route.
//!
//! A signature is the lowercase hex HMAC-SHA256, keyed by the signing secret,
//! of `"{bucket}/{key}:{version}:{expires}"`; `expires` is a unix timestamp in
//! seconds.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct UrlSigner {
    secret: String,
    base_url: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn mac(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        expires: i64,
    ) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).ok()?;
        mac.update(format!("{}/{}:{}:{}", bucket, key, version_id.unwrap_or(""), expires).as_bytes());
        Some(mac)
    }

    fn signature(&self, bucket: &str, key: &str, version_id: Option<&str>, expires: i64) -> String {
        self.mac(bucket, key, version_id, expires)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default()
    }

    /// Build a URL valid until `now + expiry_secs`.
    pub fn sign(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        expiry_secs: u64,
        now: DateTime<Utc>,
    ) -> String {
        let expires = now.timestamp() + i64::try_from(expiry_secs).unwrap_or(i64::MAX / 2);
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let mut url = format!(
            "{}/raw/{}/{}?expires={}&signature={}",
            self.base_url,
            urlencoding::encode(bucket),
            encoded_key,
            expires,
            self.signature(bucket, key, version_id, expires)
        );
        if let Some(version) = version_id {
            url.push_str("&versionId=");
            url.push_str(&urlencoding::encode(version));
        }
        url
    }

    /// Check a signature produced by [`sign`](Self::sign) and that it has not expired.
    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        if now.timestamp() >= expires {
            return false;
        }
        let (Ok(expected), Some(mac)) = (
            hex::decode(signature),
            self.mac(bucket, key, version_id, expires),
        ) else {
            return false;
        };
        mac.verify_slice(&expected).is_ok()
    }
}

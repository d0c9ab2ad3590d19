//! Merges a fresh download and a fresh version listing into a cache entry.

use crate::models::cache_entry::{CacheBody, CacheEntry, CacheKey, PayloadRecord, VersionRecord};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

/// What was just fetched from the remote store for one object.
#[derive(Debug, Clone)]
pub struct Download<'a> {
    /// Version ids from the latest version listing, in listing order.
    pub fresh_versions: &'a [String],

    /// Version the payload belongs to. `None` when the caller fetched whatever
    /// the store serves as latest without knowing its id.
    pub version_id: Option<&'a str>,

    pub payload: PayloadRecord,
}

/// Produce the updated entry for `key` from the prior entry and a new download.
///
/// The existing entry must already be known to be fresh; a stale entry should
/// be passed as `None`. An existing entry of the other versioning shape is
/// discarded rather than mixed. Versioned records are upserted in place, so
/// the result never holds two records with the same id, and records missing
/// from a shorter listing are kept with their payloads.
pub fn reconcile(
    existing: Option<CacheEntry>,
    key: &CacheKey,
    download: Download<'_>,
    versioning_enabled: bool,
    expiration: TimeDelta,
    now: DateTime<Utc>,
) -> CacheEntry {
    let expires_at = now + expiration;

    if !versioning_enabled {
        return CacheEntry {
            key: key.to_string(),
            expires_at,
            body: CacheBody::Unversioned {
                payload: download.payload,
            },
        };
    }

    let mut versions = match existing.map(|entry| entry.body) {
        Some(CacheBody::Versioned { versions }) => versions,
        Some(CacheBody::Unversioned { .. }) => {
            debug!("{} switched to versioned; dropping unversioned entry", key);
            Vec::new()
        }
        None => Vec::new(),
    };

    let mut stored_download = false;
    for version_id in download.fresh_versions {
        let target = download.version_id.is_none_or(|id| id == version_id.as_str());
        let index = versions.iter().position(|v| &v.version_id == version_id);

        match (target, index) {
            (true, Some(i)) => {
                versions[i].payload = Some(download.payload.clone());
                stored_download = true;
            }
            (true, None) => {
                versions.push(VersionRecord {
                    version_id: version_id.clone(),
                    payload: Some(download.payload.clone()),
                });
                stored_download = true;
            }
            (false, None) => versions.push(VersionRecord::placeholder(version_id.clone())),
            (false, Some(_)) => {}
        }
    }

    // The listing can lag behind the download; keep the bytes under their id anyway.
    if let (false, Some(version_id)) = (stored_download, download.version_id) {
        match versions.iter_mut().find(|v| v.version_id == version_id) {
            Some(record) => record.payload = Some(download.payload),
            None => versions.push(VersionRecord {
                version_id: version_id.to_string(),
                payload: Some(download.payload),
            }),
        }
    }

    CacheEntry {
        key: key.to_string(),
        expires_at,
        body: CacheBody::Versioned { versions },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cache_entry::Dimensions;
    use std::collections::HashSet;

    const DAY_MS: i64 = 86_400_000;

    fn payload(data: &str) -> PayloadRecord {
        PayloadRecord {
            data_url: data.into(),
            dimensions: Some(Dimensions {
                width: 10,
                height: 10,
            }),
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn versions(entry: &CacheEntry) -> &[VersionRecord] {
        match &entry.body {
            CacheBody::Versioned { versions } => versions,
            CacheBody::Unversioned { .. } => panic!("expected versioned entry"),
        }
    }

    fn key() -> CacheKey {
        CacheKey::new("bucket", "a.png")
    }

    #[test]
    fn unversioned_entry_holds_inline_payload() {
        let now = Utc::now();
        let entry = reconcile(
            None,
            &key(),
            Download {
                fresh_versions: &[],
                version_id: None,
                payload: payload("d1"),
            },
            false,
            TimeDelta::milliseconds(DAY_MS),
            now,
        );

        assert_eq!(entry.key, "bucket/a.png");
        assert_eq!(entry.expires_at, now + TimeDelta::milliseconds(DAY_MS));
        assert_eq!(
            entry.body,
            CacheBody::Unversioned {
                payload: payload("d1")
            }
        );
    }

    #[test]
    fn unknown_versions_become_placeholders() {
        let fresh = ids(&["v1", "v2"]);
        let entry = reconcile(
            None,
            &key(),
            Download {
                fresh_versions: &fresh,
                version_id: Some("v2"),
                payload: payload("d2"),
            },
            true,
            TimeDelta::hours(24),
            Utc::now(),
        );

        assert_eq!(
            versions(&entry),
            &[
                VersionRecord::placeholder("v1"),
                VersionRecord {
                    version_id: "v2".into(),
                    payload: Some(payload("d2")),
                },
            ]
        );
    }

    #[test]
    fn later_download_keeps_earlier_payloads() {
        let first = ids(&["v1", "v2"]);
        let entry = reconcile(
            None,
            &key(),
            Download {
                fresh_versions: &first,
                version_id: Some("v2"),
                payload: payload("d2"),
            },
            true,
            TimeDelta::hours(24),
            Utc::now(),
        );

        let second = ids(&["v1", "v2", "v3"]);
        let entry = reconcile(
            Some(entry),
            &key(),
            Download {
                fresh_versions: &second,
                version_id: Some("v3"),
                payload: payload("d3"),
            },
            true,
            TimeDelta::hours(24),
            Utc::now(),
        );

        let v = versions(&entry);
        assert_eq!(v.len(), 3);
        assert_eq!(v[0], VersionRecord::placeholder("v1"));
        assert_eq!(v[1].payload, Some(payload("d2")));
        assert_eq!(v[2].version_id, "v3");
        assert_eq!(v[2].payload, Some(payload("d3")));
    }

    #[test]
    fn redownload_updates_in_place() {
        let fresh = ids(&["v1", "v2"]);
        let mut entry = None;
        for data in ["d1", "d1b", "d1c"] {
            entry = Some(reconcile(
                entry,
                &key(),
                Download {
                    fresh_versions: &fresh,
                    version_id: Some("v1"),
                    payload: payload(data),
                },
                true,
                TimeDelta::hours(24),
                Utc::now(),
            ));
        }

        let entry = entry.unwrap();
        let v = versions(&entry);
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].payload, Some(payload("d1c")));
        assert_eq!(v[1].payload, None);
    }

    #[test]
    fn unknown_download_id_fills_every_listed_version() {
        let fresh = ids(&["v1", "v2"]);
        let entry = reconcile(
            None,
            &key(),
            Download {
                fresh_versions: &fresh,
                version_id: None,
                payload: payload("d"),
            },
            true,
            TimeDelta::hours(24),
            Utc::now(),
        );
        assert!(versions(&entry).iter().all(|v| v.payload == Some(payload("d"))));
    }

    #[test]
    fn shorter_listing_retains_previous_records() {
        let full = ids(&["v1", "v2", "v3"]);
        let entry = reconcile(
            None,
            &key(),
            Download {
                fresh_versions: &full,
                version_id: Some("v1"),
                payload: payload("d1"),
            },
            true,
            TimeDelta::hours(24),
            Utc::now(),
        );

        let partial = ids(&["v3"]);
        let entry = reconcile(
            Some(entry),
            &key(),
            Download {
                fresh_versions: &partial,
                version_id: Some("v3"),
                payload: payload("d3"),
            },
            true,
            TimeDelta::hours(24),
            Utc::now(),
        );

        let v = versions(&entry);
        assert_eq!(v.len(), 3);
        assert_eq!(v[0].payload, Some(payload("d1")));
        assert_eq!(v[2].payload, Some(payload("d3")));
    }

    #[test]
    fn download_missing_from_listing_is_still_stored() {
        let fresh = ids(&["v1"]);
        let entry = reconcile(
            None,
            &key(),
            Download {
                fresh_versions: &fresh,
                version_id: Some("v9"),
                payload: payload("d9"),
            },
            true,
            TimeDelta::hours(24),
            Utc::now(),
        );
        let v = versions(&entry);
        assert_eq!(v[0], VersionRecord::placeholder("v1"));
        assert_eq!(v[1].version_id, "v9");
        assert_eq!(v[1].payload, Some(payload("d9")));
    }

    #[test]
    fn duplicate_ids_in_listing_do_not_duplicate_records() {
        let listings = [ids(&["v1", "v1", "v2"]), ids(&["v2", "v1", "v2"]), ids(&["v3", "v3"])];
        let mut entry = None;
        for (round, fresh) in listings.iter().enumerate() {
            let downloaded = fresh[0].clone();
            entry = Some(reconcile(
                entry,
                &key(),
                Download {
                    fresh_versions: fresh,
                    version_id: Some(downloaded.as_str()),
                    payload: payload(&format!("d{}", round)),
                },
                true,
                TimeDelta::hours(24),
                Utc::now(),
            ));
        }

        let entry = entry.unwrap();
        let v = versions(&entry);
        let unique: HashSet<_> = v.iter().map(|r| r.version_id.as_str()).collect();
        assert_eq!(unique.len(), v.len());
        assert_eq!(v.len(), 3);
    }

    #[test]
    fn mode_switch_replaces_entry_of_other_shape() {
        let unversioned = reconcile(
            None,
            &key(),
            Download {
                fresh_versions: &[],
                version_id: None,
                payload: payload("d1"),
            },
            false,
            TimeDelta::hours(24),
            Utc::now(),
        );

        let fresh = ids(&["v1"]);
        let versioned = reconcile(
            Some(unversioned),
            &key(),
            Download {
                fresh_versions: &fresh,
                version_id: Some("v1"),
                payload: payload("d2"),
            },
            true,
            TimeDelta::hours(24),
            Utc::now(),
        );
        assert_eq!(versions(&versioned).len(), 1);

        let back = reconcile(
            Some(versioned),
            &key(),
            Download {
                fresh_versions: &[],
                version_id: None,
                payload: payload("d3"),
            },
            false,
            TimeDelta::hours(24),
            Utc::now(),
        );
        assert_eq!(
            back.body,
            CacheBody::Unversioned {
                payload: payload("d3")
            }
        );
    }

    #[test]
    fn expiry_is_refreshed_for_whole_entry() {
        let fresh = ids(&["v1"]);
        let t0 = Utc::now();
        let first = reconcile(
            None,
            &key(),
            Download {
                fresh_versions: &fresh,
                version_id: Some("v1"),
                payload: payload("d1"),
            },
            true,
            TimeDelta::hours(1),
            t0,
        );
        let t1 = t0 + TimeDelta::minutes(30);
        let second = reconcile(
            Some(first),
            &key(),
            Download {
                fresh_versions: &fresh,
                version_id: Some("v1"),
                payload: payload("d1"),
            },
            true,
            TimeDelta::hours(1),
            t1,
        );
        assert_eq!(second.expires_at, t1 + TimeDelta::hours(1));
    }
}

//! Pagination over delimiter listings, pairing objects with their versions.

use crate::{
    models::object::{ListedObject, Listing, versions_of},
    services::remote::{ObjectStore, RemoteError},
};
use futures::future::try_join_all;
use thiserror::Error;
use tracing::debug;

pub const DELIMITER: &str = "/";

/// Any failed page or per-object version fetch aborts the whole listing.
#[derive(Debug, Error)]
#[error("listing `{prefix}` failed on page {page}: {source}")]
pub struct ListingError {
    pub prefix: String,
    pub page: usize,
    #[source]
    pub source: RemoteError,
}

/// Fetch every page under `prefix`, merged in the order pages were returned.
///
/// With `versioning_enabled`, each object on a page is paired with its exact
/// version list; those sub-fetches run concurrently and are joined in listing
/// order before the next page is requested.
pub async fn fetch_all_objects(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    versioning_enabled: bool,
) -> Result<Listing, ListingError> {
    let mut listing = Listing::default();
    let mut marker: Option<String> = None;
    let mut page_no = 0;

    loop {
        page_no += 1;
        let fail = |source| ListingError {
            prefix: prefix.to_string(),
            page: page_no,
            source,
        };

        let page = store
            .list(bucket, prefix, DELIMITER, marker.as_deref())
            .await
            .map_err(fail)?;
        debug!(
            "listed page {} of {}/{}: {} objects, {} prefixes",
            page_no,
            bucket,
            prefix,
            page.entries.len(),
            page.common_prefixes.len()
        );

        // Without an explicit marker the last key or prefix on the page continues the listing.
        let next_marker = page.next_marker.clone().or_else(|| {
            let last_key = page.entries.last().map(|e| e.key.clone());
            let last_prefix = page.common_prefixes.last().cloned();
            last_key.max(last_prefix)
        });

        listing.common_prefixes.extend(page.common_prefixes);

        if versioning_enabled {
            let paired = try_join_all(page.entries.into_iter().map(|summary| async move {
                let listed = store.list_versions(bucket, &summary.key).await?;
                let versions = versions_of(&summary.key, listed);
                Ok::<_, RemoteError>(ListedObject {
                    summary,
                    versions: Some(versions),
                })
            }))
            .await
            .map_err(fail)?;
            listing.objects.extend(paired);
        } else {
            listing
                .objects
                .extend(page.entries.into_iter().map(ListedObject::unversioned));
        }

        if !page.is_truncated {
            return Ok(listing);
        }

        match next_marker {
            Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
            _ => {
                return Err(fail(RemoteError::Unavailable(
                    "truncated listing without a usable continuation marker".into(),
                )));
            }
        }
    }
}

//! Data contracts for the gallery cache.
//!
//! `cache_entry` and `profile` are the records persisted in the local cache
//! store. `object` holds the validated shapes handed back by the remote
//! object store, so nothing downstream deals with raw listing responses.

pub mod cache_entry;
pub mod object;
pub mod profile;

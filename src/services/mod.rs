pub mod cache_store;
pub mod directory_store;
pub mod gallery_service;
pub mod listing;
pub mod media;
pub mod reconciler;
pub mod remote;
pub mod resolver;
pub mod url_signer;

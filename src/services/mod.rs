//! Storage layer: naming rules, CSV catalogs and on-disk payloads.

pub mod blob_store;
pub mod bucket_catalog;
pub mod layout;
pub mod metadata_store;
pub mod name_validator;
pub mod object_catalog;
pub mod storage_service;

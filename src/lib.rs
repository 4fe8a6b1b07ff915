//! Minimal object store keeping bucket and object metadata in flat CSV
//! catalogs next to the object files.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

//! Core data models for the media library.
//!
//! Asset rows map to the `assets` table via `sqlx::FromRow` and serialize as
//! camelCase JSON on the public API. Catalog types describe a listing request
//! and the page returned for it.

pub mod asset;
pub mod catalog;

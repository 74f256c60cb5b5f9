//! Media library: multi-file ingestion into a remote object store, a
//! searchable paginated catalog of the resulting metadata, and deletion that
//! keeps the two stores in step.

pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

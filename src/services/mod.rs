//! Core services: the object store and metadata seams, and the ingestion,
//! deletion and catalog logic built on them.

pub mod catalog;
pub mod deletion;
pub mod ingestion;
pub mod library_service;
pub mod memory_store;
pub mod metadata_repository;
pub mod object_store;

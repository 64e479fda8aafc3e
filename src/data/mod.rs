//! Output writers and their registry.
pub mod storage;
pub mod storage_factory;

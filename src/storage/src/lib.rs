//! The storage server: file bytes on a local root directory, exposed to
//! clients through the Storage interface and to the naming server through
//! the Command interface.

pub mod server;

pub use server::{StorageConfig, StorageServer};

#[cfg(test)]
mod storage_server_tests;

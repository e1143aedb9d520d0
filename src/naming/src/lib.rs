//! The naming server: the directory tree, the hierarchical lock manager,
//! the read-triggered replication controller, and the registration and
//! service facades storage servers and clients reach over RMI.

pub mod locks;
pub mod replication;
pub mod server;
pub mod tree;

pub use server::{NamingConfig, NamingCore, NamingServer};

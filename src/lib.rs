//! A read-only mock of the Docker Registry HTTP API V2.
//!
//! Manifests and blobs are pre-seeded in a flat directory tree and served to
//! registry clients as they are. Nothing is ever written.

pub mod config;
pub mod digest;
pub mod error;
mod handlers;
pub mod logging;
pub mod reference;
pub mod server;
pub mod storage;
pub mod transfer;

pub use config::{LoggingConfig, RegistryConfig};
pub use error::{ApiError, RegistryError, Result};
pub use reference::Reference;
pub use server::{router, RegistryServer};
pub use storage::{BlobStream, FlatFileStore, RegistryStore};

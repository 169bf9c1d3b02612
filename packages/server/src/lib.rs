//! Public surface for the `netinsight-server` crate.
//!
//! Exposes the router builder, storage backends and config types so that
//! external crates (the operator CLI, the conformance test suite) can open the
//! store directly or spin up an in-process server without spawning a
//! subprocess.

pub mod config;
pub mod error;
pub mod export;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod storage;

pub use config::ServerConfig;
pub use middleware::auth::generate_api_key;
pub use router::build_router;
pub use storage::{memory::MemoryStorage, sqlite::SqliteStorage, Storage, StorageError};

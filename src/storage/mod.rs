//! Storage Engine Module
//!
//! A thread-safe, sharded key-value store. One instance is created at
//! startup and shared by every connection for the life of the process.
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **Atomic Operations**: every `set`/`get` runs under one shard lock
//! - **Access Stamps**: each entry records when it was last read or written
//! - **TTL Recording**: an optional lifetime is stored per entry (not enforced)
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"));
//! assert_eq!(engine.get(b"name").map(|e| e.value), Some(Bytes::from("Ariz")));
//!
//! engine.set_with_ttl(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Duration::from_secs(3600),
//! );
//! ```

pub mod engine;

pub use engine::{Entry, StorageEngine, StorageStats};

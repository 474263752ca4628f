//! # EmberKV - A Small Redis-Compatible Key-Value Server
//!
//! EmberKV keeps string keys and values in memory and serves them over the
//! RESP wire protocol, so `redis-cli` and ordinary Redis client libraries
//! can talk to it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             EmberKV                              │
//! │                                                                  │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐           │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │           │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │           │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘           │
//! │                            │                  │                  │
//! │                            ▼                  ▼                  │
//! │                     ┌─────────────┐    ┌───────────────────────┐ │
//! │                     │    RESP     │    │     StorageEngine     │ │
//! │                     │   Decoder   │    │  64 × RwLock<HashMap> │ │
//! │                     └─────────────┘    └───────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per connection: bytes in → decoder → `Command` → command handler
//! (reads or mutates the store) → `RespValue` → encoder → bytes out.
//!
//! ## Supported Commands
//!
//! - `PING [message]`
//! - `ECHO message`
//! - `SET key value [EX seconds | PX milliseconds]`
//! - `GET key`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP types, reply encoding and request decoding
//! - [`storage`]: thread-safe sharded store
//! - [`commands`]: command dispatch
//! - [`connection`]: per-client read/execute/reply loop

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

pub use commands::CommandHandler;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{decode_command, Command, ParseError, RespParser, RespValue};
pub use storage::{Entry, StorageEngine};

/// The default port EmberKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host EmberKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

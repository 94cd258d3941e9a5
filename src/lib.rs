//! # cider - A Small In-Memory Key-Value Cache
//!
//! cider is an in-memory key-value cache reachable over a line-oriented text
//! protocol. It covers the core of a Redis-like cache: byte-string values,
//! per-key expiry, and atomic counters.
//!
//! ## Features
//!
//! - **Line Protocol**: One command per line, fields separated by whitespace
//! - **Concurrent Store**: Sharded structural locks plus one lock per entry
//! - **TTL Support**: Absolute expiry with lazy and periodic cleanup
//! - **Async I/O**: Built on Tokio, two tasks per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               cider                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│  Session    │───>│  Command    │                  │
//! │  │ (Listener)  │    │ in / out    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │  Command    │    │                   Store                      │    │
//! │  │  Parser +   │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │  │  Replies    │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...63   │ │    │
//! │  └─────────────┘    │  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │                     └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │     Periodic tasks (expiry sweep, stats)        │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use cider::server::accept_loop;
//! use cider::session::ConnectionStats;
//! use cider::storage::{start_expiry_sweeper, Store};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(Store::new());
//!     let _sweeper = start_expiry_sweeper(Arc::clone(&store), Duration::from_secs(1));
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!     accept_loop(listener, store, stats).await;
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value... [NX|XX] [GET] [EX seconds|EXAT epoch] [KEEPTTL]`
//! - `GET key`
//! - `DEL key [key ...]`
//! - `EXISTS key [key ...]`
//! - `EXPIRE key seconds [NX|XX|GT|LT]`
//! - `INCR key` / `DECR key`
//!
//! ## Module Overview
//!
//! - [`protocol`]: Command parser, typed operations and reply encoding
//! - [`storage`]: The concurrent store and the expiry sweep
//! - [`commands`]: Executes operations against the store
//! - [`session`]: Per-connection read and write stages
//! - [`server`]: Accept loop and stats reporter
//! - [`task`]: Periodic background jobs
//! - [`config`]: Defaults, environment and command-line settings
//!
//! ## Design Highlights
//!
//! ### Two-Tier Locking
//!
//! Inserting or removing a key takes the write lock of one of 64 shards.
//! Changing a value or expiry only takes that entry's own lock, so counters
//! on different keys never contend.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with an expiry are removed in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Active**: A periodic task reaps expired keys nobody touches

pub mod commands;
pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
pub mod storage;
pub mod task;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::{Config, ConfigError, Invocation};
pub use protocol::{parse_command, Operation, ParseError, Reply};
pub use session::{handle_connection, ConnectionStats, Session, SessionError};
pub use storage::{start_expiry_sweeper, Store, StoreError};
pub use task::{Task, TaskHandle};

/// The default port cider listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host cider binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of cider
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

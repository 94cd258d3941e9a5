//! Storage Module
//!
//! This module provides the shared key/value store and the active expiry
//! sweep that runs on top of it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Store                              │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │            │
//! │  └────┬────┘ └─────────┘ └─────────┘ └─────────┘            │
//! │       └── per-entry RwLock (value + expiry)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │   expiry sweep (Task)     │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Two-tier locking**: map lock for structure, entry lock for contents
//! - **Absolute expiry**: expiries are stored as UNIX seconds
//! - **Lazy Expiry**: Expired keys are reaped on access
//! - **Active Expiry**: A periodic task reaps keys nobody touches
//!
//! ## Example
//!
//! ```
//! use cider::storage::{unix_now, Store, NO_EXPIRY};
//! use bytes::Bytes;
//!
//! let store = Store::new();
//!
//! store.set("name", Bytes::from("cider"), None);
//! assert_eq!(store.ttl("name"), NO_EXPIRY);
//!
//! let at = unix_now() + 3600;
//! store.set("session", Bytes::from("token123"), Some(at));
//! assert_eq!(store.ttl("session"), at);
//! ```

pub mod engine;
pub mod expiry;

// Re-export commonly used types
pub use engine::{
    unix_now, Entry, ExpireFlags, SetCondition, SetOptions, SetOutcome, StorageStats, Store,
    StoreError, KEY_NOT_FOUND, NO_EXPIRY,
};
pub use expiry::{expiry_task, start_expiry_sweeper, sweep_expired};

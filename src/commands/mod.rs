//! Command Handler Module
//!
//! This module implements the command processing layer.
//! It receives raw command lines, parses them into typed operations,
//! executes them against the store and returns the reply.
//!
//! ## Architecture
//!
//! ```text
//! Client line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │ Command Parser  │  (protocol module)
//! └────────┬────────┘
//!          │ Operation
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Store      │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET`, `GET`, `DEL`, `EXISTS`
//! - `EXPIRE`
//! - `INCR`, `DECR`

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;

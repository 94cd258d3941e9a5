//! Typed operations produced by the command parser.
//!
//! Each variant carries only the fields its command needs, so the dispatcher
//! has to handle every command kind exhaustively.

use bytes::Bytes;
use std::fmt;

/// A fully parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// `SET key value... [NX|XX] [GET] [EX secs|EXAT epoch] [KEEPTTL]`
    Set(SetOperation),
    /// `GET key`
    Get { key: String },
    /// `DEL key...`
    Del { keys: Vec<String> },
    /// `EXISTS key...`
    Exists { keys: Vec<String> },
    /// `EXPIRE key seconds [NX|XX|GT|LT]`
    Expire(ExpireOperation),
    /// `INCR key`
    Incr { key: String },
    /// `DECR key`
    Decr { key: String },
}

impl Operation {
    /// The command name, as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Set(_) => "SET",
            Operation::Get { .. } => "GET",
            Operation::Del { .. } => "DEL",
            Operation::Exists { .. } => "EXISTS",
            Operation::Expire(_) => "EXPIRE",
            Operation::Incr { .. } => "INCR",
            Operation::Decr { .. } => "DECR",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Expiry requested by `SET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// `EX <seconds>`: relative to the time the command executes.
    Seconds(i64),
    /// `EXAT <epoch>`: absolute UNIX time in seconds.
    UnixTime(i64),
}

impl Expiry {
    /// Resolves the expiry to absolute epoch seconds.
    pub fn resolve(self, now: i64) -> i64 {
        match self {
            Expiry::Seconds(secs) => now.saturating_add(secs),
            Expiry::UnixTime(at) => at,
        }
    }
}

/// Payload of a `SET` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOperation {
    pub key: String,
    pub value: Bytes,
    /// Only set if the key does not exist.
    pub nx: bool,
    /// Only set if the key already exists.
    pub xx: bool,
    /// Reply with the previous value instead of `OK`.
    pub get: bool,
    pub expiry: Option<Expiry>,
    /// Keep the current expiry when no new one is given.
    pub keep_ttl: bool,
}

/// Payload of an `EXPIRE` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpireOperation {
    pub key: String,
    /// Seconds from now.
    pub ttl: i64,
    pub nx: bool,
    pub xx: bool,
    pub gt: bool,
    pub lt: bool,
}

//! Command Handler
//!
//! Executes parsed [`Operation`]s against the [`Store`] and produces the
//! single [`Reply`] each command is owed.
//!
//! ## Reply Table
//!
//! | Command  | Success                         | Miss / not applied |
//! |----------|---------------------------------|--------------------|
//! | `SET`    | `+OK` (or old value with `GET`) | `_`                |
//! | `GET`    | `$<len>` bulk                   | `_`                |
//! | `DEL`    | `:<removed>`                    | `:0`               |
//! | `EXISTS` | `:<present>`                    | `:0`               |
//! | `EXPIRE` | `:1`                            | `:0`               |
//! | `INCR`   | `+OK`                           | `-ERR ...`         |
//! | `DECR`   | `+OK`                           | `-ERR ...`         |
//!
//! Parse failures and store errors become `-ERR <message>` replies; the
//! session keeps going either way.

use crate::protocol::{parse_command, ExpireOperation, Operation, Reply, SetOperation};
use crate::storage::{unix_now, ExpireFlags, SetCondition, SetOptions, Store, StoreError};
use std::sync::Arc;
use tracing::debug;

/// Handles commands by dispatching them to the store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The shared store
    store: Arc<Store>,
}

impl CommandHandler {
    /// Creates a new command handler with the given store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Returns the store this handler executes against.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Parses and executes one command line.
    ///
    /// # Arguments
    ///
    /// * `line` - The command line with its terminator already removed
    ///
    /// # Returns
    ///
    /// The reply to send back to the client.
    pub fn execute(&self, line: &[u8]) -> Reply {
        match parse_command(line) {
            Ok(op) => self.dispatch(op),
            Err(e) => {
                debug!(error = %e, "Rejected command");
                Reply::error(e)
            }
        }
    }

    /// Executes a parsed operation.
    pub fn dispatch(&self, op: Operation) -> Reply {
        match op {
            Operation::Set(set) => self.cmd_set(set),
            Operation::Get { key } => self.cmd_get(&key),
            Operation::Del { keys } => Reply::integer(self.store.del(&keys) as i64),
            Operation::Exists { keys } => Reply::integer(self.store.exists(&keys) as i64),
            Operation::Expire(expire) => self.cmd_expire(expire),
            Operation::Incr { key } => counter_reply(self.store.incr(&key)),
            Operation::Decr { key } => counter_reply(self.store.decr(&key)),
        }
    }

    /// SET key value... [NX|XX] [GET] [EX seconds|EXAT epoch] [KEEPTTL]
    fn cmd_set(&self, set: SetOperation) -> Reply {
        let condition = if set.nx {
            SetCondition::IfAbsent
        } else if set.xx {
            SetCondition::IfPresent
        } else {
            SetCondition::Always
        };

        let options = SetOptions {
            condition,
            expires_at: set.expiry.map(|expiry| expiry.resolve(unix_now())),
            keep_ttl: set.keep_ttl,
        };

        let outcome = self.store.set_with(set.key, set.value, options);

        if set.get {
            return outcome.previous.map_or(Reply::Nil, Reply::Bulk);
        }
        if outcome.applied {
            Reply::Ok
        } else {
            Reply::Nil
        }
    }

    /// GET key
    fn cmd_get(&self, key: &str) -> Reply {
        match self.store.get(key) {
            Ok((value, _)) => Reply::Bulk(value),
            Err(StoreError::NotFound) => Reply::Nil,
            Err(e) => Reply::error(e),
        }
    }

    /// EXPIRE key seconds [NX|XX|GT|LT]
    fn cmd_expire(&self, expire: ExpireOperation) -> Reply {
        let flags = ExpireFlags {
            nx: expire.nx,
            xx: expire.xx,
            gt: expire.gt,
            lt: expire.lt,
        };

        let updated = self.store.expire(&expire.key, expire.ttl, flags);
        Reply::integer(updated as i64)
    }
}

/// The new counter value is written back, not echoed.
fn counter_reply(result: Result<i64, StoreError>) -> Reply {
    match result {
        Ok(_) => Reply::Ok,
        Err(e) => Reply::error(e),
    }
}

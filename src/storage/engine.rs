//! Thread-Safe Store with Lazy Expiry
//!
//! This module implements the key/value/TTL map shared by every session.
//!
//! ## Design Decisions
//!
//! 1. **Two-tier locks**: a structural lock guards the map slots, and every
//!    entry carries its own lock for value and expiry changes.
//! 2. **Sharded maps**: the structural lock is split over 64 shards so that
//!    inserts and deletes on unrelated keys rarely meet.
//! 3. **Lazy expiry only**: an expired entry stays in its slot until someone
//!    touches it. The store never sweeps on its own.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Store                              │
//! │  ┌──────────────┐ ┌──────────────┐        ┌──────────────┐   │
//! │  │   Shard 0    │ │   Shard 1    │  ...   │   Shard 63   │   │
//! │  │ RwLock<Map>  │ │ RwLock<Map>  │        │ RwLock<Map>  │   │
//! │  └──────┬───────┘ └──────────────┘        └──────────────┘   │
//! │         │ key -> Arc<RwLock<Entry>>                          │
//! │         ▼                                                    │
//! │  ┌──────────────┐                                            │
//! │  │ Entry lock   │  value + expires_at                        │
//! │  └──────────────┘                                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are always taken map first, entry second. Nothing takes a map lock
//! while holding an entry lock, so the two tiers cannot deadlock.
//!
//! An entry whose expiry has passed is dead: every mutating path checks the
//! expiry under the entry lock first, and SET installs a fresh entry instead
//! of writing into the old one. A dead entry can therefore be unlinked by
//! pointer identity without re-checking it.

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Number of shards for the structural lock.
const NUM_SHARDS: usize = 64;

/// Reported by [`Store::ttl`] for a key without expiry.
pub const NO_EXPIRY: i64 = -1;

/// Reported by [`Store::ttl`] for a missing or expired key.
pub const KEY_NOT_FOUND: i64 = -2;

/// Errors returned by store operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The key is absent or has expired
    #[error("key not found")]
    NotFound,

    /// The stored value does not parse as a base-10 64-bit integer
    #[error("value is not an integer or out of range")]
    NotAnInteger,

    /// The increment or decrement would leave the i64 range
    #[error("increment or decrement would overflow")]
    Overflow,
}

/// Current UNIX time in whole seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A stored value plus its expiration timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// Absolute expiry in UNIX seconds (None = never expires)
    pub expires_at: Option<i64>,
}

impl Entry {
    /// Creates a new entry. Zero or negative expiry means "never".
    pub fn new(value: Bytes, expires_at: Option<i64>) -> Self {
        Self {
            value,
            expires_at: expires_at.filter(|at| *at > 0),
        }
    }

    /// Checks if this entry has expired at the given time.
    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Which existing state a conditional set requires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SetCondition {
    #[default]
    Always,
    /// Only if the key is absent (NX)
    IfAbsent,
    /// Only if the key is present (XX)
    IfPresent,
}

/// Options for [`Store::set_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    pub condition: SetCondition,
    /// Absolute expiry for the new entry
    pub expires_at: Option<i64>,
    /// Keep the previous expiry when `expires_at` is `None`
    pub keep_ttl: bool,
}

/// Result of [`Store::set_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOutcome {
    /// Whether the new value was written
    pub applied: bool,
    /// The live value held before the call, if any
    pub previous: Option<Bytes>,
}

/// Conditions gating an [`Store::expire`] update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpireFlags {
    /// Only if the key has no expiry
    pub nx: bool,
    /// Only if the key already has an expiry
    pub xx: bool,
    /// Only if the new expiry is later than the current one
    pub gt: bool,
    /// Only if the new expiry is earlier than the current one
    pub lt: bool,
}

impl ExpireFlags {
    /// Decides whether moving the expiry from `current` to `new_at` is allowed.
    ///
    /// A key without expiry counts as expiring at infinity for GT and LT, as
    /// Redis does: GT is refused and LT applies. Treating it as zero for LT
    /// would refuse LT too, contradicting Redis.
    pub fn permits(&self, current: Option<i64>, new_at: i64) -> bool {
        if self.nx && current.is_some() {
            return false;
        }
        if self.xx && current.is_none() {
            return false;
        }
        if self.gt && !current.is_some_and(|at| new_at > at) {
            return false;
        }
        if self.lt && current.is_some_and(|at| new_at >= at) {
            return false;
        }
        true
    }
}

type Slot = Arc<RwLock<Entry>>;

/// A single shard: the structural lock over a portion of the key space.
#[derive(Debug, Default)]
struct Shard {
    slots: RwLock<HashMap<String, Slot>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// The concurrent key/value store.
///
/// Designed to be wrapped in an `Arc` and shared by all sessions and
/// periodic tasks. All operations are thread-safe and never block on I/O.
///
/// # Example
///
/// ```
/// use cider::storage::Store;
/// use bytes::Bytes;
///
/// let store = Store::new();
/// store.set("name", Bytes::from("cider"), None);
///
/// let (value, expires_at) = store.get("name").unwrap();
/// assert_eq!(value, Bytes::from("cider"));
/// assert_eq!(expires_at, None);
/// ```
pub struct Store {
    shards: Vec<Shard>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total keys removed by DEL
    del_count: AtomicU64,

    /// Statistics: number of expired keys reaped
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Looks up the slot for a key under the shared map lock.
    fn slot(&self, key: &str) -> Option<Slot> {
        read(&self.shard(key).slots).get(key).cloned()
    }

    /// Unlinks a dead entry, unless the slot was replaced meanwhile.
    fn reap(&self, key: &str, dead: &Slot) {
        let mut slots = write(&self.shard(key).slots);
        if slots.get(key).is_some_and(|slot| Arc::ptr_eq(slot, dead)) {
            slots.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Returns a copy of the live entry, reaping it if it has expired.
    fn live_entry(&self, key: &str) -> Option<Entry> {
        let slot = self.slot(key)?;
        {
            let entry = read(&slot);
            if !entry.is_expired_at(unix_now()) {
                return Some(entry.clone());
            }
        }
        self.reap(key, &slot);
        None
    }

    /// Gets the value and absolute expiry for a key.
    ///
    /// An expired entry is removed as a side effect and reported as
    /// [`StoreError::NotFound`].
    pub fn get(&self, key: &str) -> Result<(Bytes, Option<i64>), StoreError> {
        self.get_count.fetch_add(1, Ordering::Relaxed);
        self.live_entry(key)
            .map(|entry| (entry.value, entry.expires_at))
            .ok_or(StoreError::NotFound)
    }

    /// Inserts or replaces a key unconditionally.
    ///
    /// `None`, zero or a negative `expires_at` stores the key without expiry.
    pub fn set(&self, key: impl Into<String>, value: Bytes, expires_at: Option<i64>) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let key = key.into();
        let slot = Arc::new(RwLock::new(Entry::new(value, expires_at)));
        write(&self.shard(&key).slots).insert(key, slot);
    }

    /// Conditionally inserts or replaces a key in one critical section.
    ///
    /// The previous live value is reported whether or not the write happens.
    pub fn set_with(&self, key: impl Into<String>, value: Bytes, options: SetOptions) -> SetOutcome {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let key = key.into();
        let now = unix_now();
        let mut slots = write(&self.shard(&key).slots);

        let previous = slots.get(&key).and_then(|slot| {
            let entry = read(slot);
            (!entry.is_expired_at(now)).then(|| entry.clone())
        });

        let applied = match options.condition {
            SetCondition::Always => true,
            SetCondition::IfAbsent => previous.is_none(),
            SetCondition::IfPresent => previous.is_some(),
        };

        if applied {
            let expires_at = match options.expires_at {
                Some(at) => Some(at),
                None if options.keep_ttl => previous.as_ref().and_then(|entry| entry.expires_at),
                None => None,
            };
            let slot = Arc::new(RwLock::new(Entry::new(value, expires_at)));
            slots.insert(key, slot);
        }

        SetOutcome {
            applied,
            previous: previous.map(|entry| entry.value),
        }
    }

    /// Deletes keys. Missing keys are skipped.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were removed.
    pub fn del<K: AsRef<str>>(&self, keys: &[K]) -> usize {
        let deleted = keys
            .iter()
            .filter(|key| {
                let key = key.as_ref();
                write(&self.shard(key).slots).remove(key).is_some()
            })
            .count();

        self.del_count.fetch_add(deleted as u64, Ordering::Relaxed);
        deleted
    }

    /// Counts how many of the given keys are present.
    ///
    /// Presence only: a key that has expired but was not touched since still
    /// counts until the next access reaps it.
    pub fn exists<K: AsRef<str>>(&self, keys: &[K]) -> usize {
        keys.iter()
            .filter(|key| {
                let key = key.as_ref();
                read(&self.shard(key).slots).contains_key(key)
            })
            .count()
    }

    /// Sets the expiry of a live key to `now + ttl_secs`.
    ///
    /// # Returns
    ///
    /// Returns `true` if the expiry was updated, `false` if the key is absent
    /// or `flags` rejected the update.
    pub fn expire(&self, key: &str, ttl_secs: i64, flags: ExpireFlags) -> bool {
        let Some(slot) = self.slot(key) else {
            return false;
        };

        let now = unix_now();
        let new_at = now.saturating_add(ttl_secs);
        {
            let mut entry = write(&slot);
            if !entry.is_expired_at(now) {
                if !flags.permits(entry.expires_at, new_at) {
                    return false;
                }
                entry.expires_at = Some(new_at);
                return true;
            }
        }

        self.reap(key, &slot);
        false
    }

    /// Gets the expiry of a key.
    ///
    /// # Returns
    ///
    /// - the absolute expiry in UNIX seconds if the key has one
    /// - [`NO_EXPIRY`] (`-1`) if the key exists without expiry
    /// - [`KEY_NOT_FOUND`] (`-2`) if the key is absent or expired
    pub fn ttl(&self, key: &str) -> i64 {
        match self.live_entry(key) {
            Some(entry) => entry.expires_at.unwrap_or(NO_EXPIRY),
            None => KEY_NOT_FOUND,
        }
    }

    /// Applies `f` to the current value of a live key and stores the result,
    /// keeping the expiry. The entry lock is held for the whole call, so
    /// concurrent updates of one key are serialized.
    ///
    /// # Returns
    ///
    /// Returns the new value, [`StoreError::NotFound`] for a missing or
    /// expired key, or the error produced by `f` (the value is left as is).
    pub fn update<F>(&self, key: &str, f: F) -> Result<Bytes, StoreError>
    where
        F: FnOnce(&Bytes) -> Result<Bytes, StoreError>,
    {
        let slot = self.slot(key).ok_or(StoreError::NotFound)?;
        {
            let mut entry = write(&slot);
            if !entry.is_expired_at(unix_now()) {
                let value = f(&entry.value)?;
                entry.value = value.clone();
                return Ok(value);
            }
        }

        self.reap(key, &slot);
        Err(StoreError::NotFound)
    }

    /// Increments an integer value by 1.
    pub fn incr(&self, key: &str) -> Result<i64, StoreError> {
        self.incr_by(key, 1)
    }

    /// Decrements an integer value by 1.
    pub fn decr(&self, key: &str) -> Result<i64, StoreError> {
        self.incr_by(key, -1)
    }

    /// Adds `delta` to an integer value atomically.
    ///
    /// The key must exist and hold a base-10 64-bit integer.
    pub fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut result = 0;
        self.update(key, |current| {
            let number = std::str::from_utf8(current)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(StoreError::NotAnInteger)?;
            result = number.checked_add(delta).ok_or(StoreError::Overflow)?;
            Ok(Bytes::from(result.to_string()))
        })?;
        Ok(result)
    }

    /// Snapshot of the keys whose expiry has passed but which are still
    /// present. Read-only; reaping is left to the regular access paths.
    pub fn expired_keys(&self) -> Vec<String> {
        let now = unix_now();
        let mut expired = Vec::new();

        for shard in &self.shards {
            let slots = read(&shard.slots);
            expired.extend(
                slots
                    .iter()
                    .filter(|(_, slot)| read(slot).is_expired_at(now))
                    .map(|(key, _)| key.clone()),
            );
        }

        expired
    }

    /// Returns the number of keys present, including expired ones that were
    /// not reaped yet.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| read(&shard.slots).len()).sum()
    }

    /// Returns true if the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| read(&shard.slots).is_empty())
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len() as u64,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of keys currently present
    pub keys: u64,
    /// Total GET operations
    pub get_ops: u64,
    /// Total SET operations
    pub set_ops: u64,
    /// Total keys removed by DEL
    pub del_ops: u64,
    /// Total expired keys reaped
    pub expired: u64,
}

//! Key-value store seam.
//!
//! The aggregation engine only assumes a store that can:
//!
//! - execute one multi-key read-modify-write step atomically
//! - get/mget string values
//! - set a value only if absent, refreshing its TTL either way
//! - read a bounded range from a list
//! - remove from and pattern-scan a sorted index
//!
//! `MemoryStore` is the bundled implementation: a single mutex-guarded
//! keyspace, so the atomic step is trivially indivisible. A networked
//! implementation would map the same operations onto its server's scripted
//! or transactional primitives.

mod memory;

use std::time::Duration;

pub use memory::MemoryStore;

/// Error from the store seam. Always fatal to the triggering call; the engine
/// never retries internally.
#[derive(Debug)]
pub enum StoreError {
    /// The store could not be reached or the atomic step failed to execute.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Primitive keyspace operations available inside an atomic step.
///
/// Mirrors the store commands the record protocol composes; an implementor
/// provides these under whatever exclusion its `StatStore::atomic` guarantees.
pub trait Keyspace {
    /// Read a scalar value. Expired keys read as absent.
    fn get(&mut self, key: &str) -> Option<String>;

    /// Write a scalar value, replacing any previous one.
    fn set(&mut self, key: &str, value: String);

    /// Increment an integer value, initializing an absent key to 0 first.
    fn incr(&mut self, key: &str) -> i64;

    /// Add to a float value, initializing an absent key to 0.0 first.
    ///
    /// Non-finite deltas are written through; the engine deliberately does
    /// not validate observation values.
    fn incr_by_float(&mut self, key: &str, delta: f64) -> f64;

    /// Push an entry onto the front of a list, creating it if absent.
    fn lpush(&mut self, key: &str, entry: String);

    /// Trim a list to its first `len` entries.
    fn ltrim(&mut self, key: &str, len: usize);

    /// Refresh the expiration deadline of a key.
    fn expire(&mut self, key: &str, ttl: Duration);

    /// Add a member to a sorted index set. Idempotent.
    fn index_add(&mut self, key: &str, member: &str);
}

/// Contract between the aggregation engine and its backing store.
///
/// All methods may fail with `StoreError::Unavailable`; none retry.
pub trait StatStore: Send + Sync {
    /// Run `step` with exclusive access to the keyspace. Every mutation made
    /// by `step` becomes visible to other callers together, or not at all.
    fn atomic(&self, step: &mut dyn FnMut(&mut dyn Keyspace)) -> Result<(), StoreError>;

    /// Fetch several scalar values at once. Absent or expired keys yield
    /// `None` in their position.
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Write `value` under `key` only if the key is absent. The TTL is
    /// refreshed whether or not the write happened. Returns true when the
    /// value was newly written.
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Read up to `limit` entries from the front of a list. Unknown keys
    /// yield an empty range.
    fn list_range(&self, key: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Remove a member from a sorted index set. Removing an absent member is
    /// a no-op.
    fn index_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Scan a sorted index set for members matching a Redis-style glob
    /// pattern. The result is finite and not restartable; callers must
    /// tolerate duplicate members when the set changes between scans.
    fn index_scan(&self, key: &str, pattern: &str) -> Result<Vec<String>, StoreError>;
}

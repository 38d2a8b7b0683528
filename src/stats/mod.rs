//! Aggregation engine, side stores and query layer.
//!
//! Split across:
//!
//! - `types.rs`: aggregate/history data types and stored-value decoding
//! - `keys.rs`: the deterministic keyspace layout
//! - `engine.rs`: the atomic per-observation update protocol
//! - `context.rs`: content-hash deduplicated context payloads
//! - `query.rs`: aggregate/history/label/context reads
//! - `session.rs`: buffered recording sessions (blocking and async)
//! - `timer.rs`: elapsed-time helper for duration stats

mod context;
mod engine;
mod keys;
mod query;
mod session;
mod timer;
mod types;

pub use context::{contexts, hash_context};
pub use engine::{now_timestamp, push_stat, write_stat};
pub use keys::{Field, StatKeys};
pub use query::{history, labels, summary};
pub use session::{AsyncStats, Stats};
pub use timer::{timer, Timer, TimerStat};
pub use types::{HistoryEntry, MalformedHistoryEntry, StatDelta, StatSummary};

use crate::store::StoreError;

/// Error taxonomy for stats operations.
#[derive(Debug)]
pub enum StatsError {
    /// The store could not be reached or the atomic step failed. Fatal to
    /// the triggering call; never retried here.
    Storage(StoreError),
    /// The label has no aggregate: never observed, or aged out. A normal
    /// outcome for query operations, not a fault.
    NotFound,
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsError::Storage(e) => write!(f, "{}", e),
            StatsError::NotFound => write!(f, "no aggregate recorded for label"),
        }
    }
}

impl std::error::Error for StatsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatsError::Storage(e) => Some(e),
            StatsError::NotFound => None,
        }
    }
}

impl From<StoreError> for StatsError {
    fn from(e: StoreError) -> Self {
        StatsError::Storage(e)
    }
}

//! Label-keyed metrics aggregation and export.
//!
//! Callers submit numeric observations under a string label, optionally with
//! an opaque context payload and extra dimension labels. Per label the engine
//! maintains:
//!
//! - a running aggregate (count, avg, stdev, max, min, total, last value,
//!   last observation time), updated by a single atomic keyspace step
//! - a bounded newest-first history of raw observations
//! - a discovery index of every label observed so far
//! - a content-hash deduplicated store of context payloads
//!
//! The export pipeline walks the discovery index and renders each label's
//! aggregate into Prometheus-style exposition lines through a
//! prefix-dispatched formatter registry.
//!
//! All label-scoped keys expire after two weeks without a write, so the
//! keyspace is self-cleaning; the discovery index is advisory and prunes
//! itself lazily when a fetch finds the aggregate gone.

pub mod config;
pub mod export;
pub mod stats;
pub mod store;

pub use config::Settings;
pub use export::{Exporter, FormatterRegistry};
pub use stats::{
    push_stat, timer, AsyncStats, HistoryEntry, StatDelta, StatSummary, Stats, StatsError,
};
pub use store::{MemoryStore, StatStore, StoreError};

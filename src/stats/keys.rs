//! Keyspace layout for stats storage.
//!
//! Every entry is namespace-qualified so deployments sharing one store never
//! collide:
//!
//! - `NS::{FIELD}::{label}` - one scalar aggregate field
//! - `NS::HISTORY::{label}` - bounded newest-first observation list
//! - `NS::INDEX` - discovery set of all observed labels
//! - `NS::CONTEXTS::{hash}` - deduplicated context payload
//!
//! Each scalar field is independently addressable, which lets readers fetch a
//! subset cheaply, at the price of torn (per-field consistent, not snapshot
//! consistent) reads between two atomic updates.

use serde::{Deserialize, Serialize};

/// One scalar aggregate field of a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Count,
    Avg,
    Stdev,
    Max,
    Min,
    Total,
    /// Running sum of squares feeding the stdev estimator. Never exposed.
    TotalSq,
    Last,
    LastTime,
}

impl Field {
    /// Fields making up a fetched summary, in wire order.
    pub const SUMMARY: [Field; 8] = [
        Field::Count,
        Field::Avg,
        Field::Stdev,
        Field::Max,
        Field::Min,
        Field::Total,
        Field::Last,
        Field::LastTime,
    ];

    /// Fields the exporter reports. `LastTime` is bookkeeping, not a metric,
    /// and `TotalSq` is internal.
    pub const REPORTABLE: [Field; 7] = [
        Field::Count,
        Field::Avg,
        Field::Stdev,
        Field::Max,
        Field::Min,
        Field::Total,
        Field::Last,
    ];

    /// Uppercase key segment for this field.
    pub fn key_part(self) -> &'static str {
        match self {
            Field::Count => "COUNT",
            Field::Avg => "AVG",
            Field::Stdev => "STDEV",
            Field::Max => "MAX",
            Field::Min => "MIN",
            Field::Total => "TOTAL",
            Field::TotalSq => "TOTAL_SQ",
            Field::Last => "LAST",
            Field::LastTime => "LAST_TIME",
        }
    }
}

/// Builds namespace-qualified keys for every stored entity.
pub struct StatKeys;

impl StatKeys {
    /// Key of one scalar aggregate field: `NS::{FIELD}::{label}`.
    pub fn scalar(namespace: &str, field: Field, label: &str) -> String {
        format!("{}::{}::{}", namespace, field.key_part(), label)
    }

    /// Key of a label's history list: `NS::HISTORY::{label}`.
    pub fn history(namespace: &str, label: &str) -> String {
        format!("{}::HISTORY::{}", namespace, label)
    }

    /// Key of the discovery index: `NS::INDEX`.
    pub fn index(namespace: &str) -> String {
        format!("{}::INDEX", namespace)
    }

    /// Key of a deduplicated context payload: `NS::CONTEXTS::{hash}`.
    pub fn context(namespace: &str, context_id: &str) -> String {
        format!("{}::CONTEXTS::{}", namespace, context_id)
    }
}

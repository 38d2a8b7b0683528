//! Aggregate and history data types.

use serde::{Deserialize, Serialize};

use super::keys::Field;

/// Fresh scalar snapshot returned by the atomic record step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatDelta {
    pub count: i64,
    pub avg: f64,
    pub stdev: f64,
    pub max: f64,
    pub min: f64,
    pub total: f64,
}

/// A label's current aggregate as read back from the store.
///
/// Each field is `None` when its key is absent or holds a value that does not
/// decode to a finite float. Fields are independently addressable in the
/// store, so a summary read concurrently with an update can be torn across
/// fields; every individual field is still self-consistent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatSummary {
    pub count: Option<f64>,
    pub avg: Option<f64>,
    pub stdev: Option<f64>,
    pub max: Option<f64>,
    pub min: Option<f64>,
    pub total: Option<f64>,
    pub last: Option<f64>,
    pub last_time: Option<f64>,
}

impl StatSummary {
    /// Look up a field by its keyspace identity. `TotalSq` is internal and
    /// always reads as absent here.
    pub fn field(&self, field: Field) -> Option<f64> {
        match field {
            Field::Count => self.count,
            Field::Avg => self.avg,
            Field::Stdev => self.stdev,
            Field::Max => self.max,
            Field::Min => self.min,
            Field::Total => self.total,
            Field::TotalSq => None,
            Field::Last => self.last,
            Field::LastTime => self.last_time,
        }
    }
}

/// One raw observation decoded from a label's history list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: f64,
    pub label: String,
    pub value: f64,
    pub context_id: String,
}

/// A stored history entry that does not decode to at least two `;`-delimited
/// numeric fields. History is best-effort telemetry: the query layer skips
/// these and keeps going.
#[derive(Debug)]
pub struct MalformedHistoryEntry {
    raw: String,
}

impl std::fmt::Display for MalformedHistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed history entry: {:?}", self.raw)
    }
}

impl std::error::Error for MalformedHistoryEntry {}

/// Decode one history list entry of the form `"{timestamp};{value};{context_id}"`.
///
/// A missing third field parses as an empty context id.
pub fn parse_history_entry(label: &str, raw: &str) -> Result<HistoryEntry, MalformedHistoryEntry> {
    let mut parts = raw.splitn(3, ';');
    let timestamp = parts.next().and_then(|p| p.parse::<f64>().ok());
    let value = parts.next().and_then(|p| p.parse::<f64>().ok());

    match (timestamp, value) {
        (Some(timestamp), Some(value)) => Ok(HistoryEntry {
            timestamp,
            label: label.to_string(),
            value,
            context_id: parts.next().unwrap_or("").to_string(),
        }),
        _ => Err(MalformedHistoryEntry {
            raw: raw.to_string(),
        }),
    }
}

/// Decode a stored scalar to a finite float. Empty, unparsable and non-finite
/// values all read as absent.
pub fn value_to_float(raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

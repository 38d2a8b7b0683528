//! The atomic per-observation update protocol.
//!
//! One observation touches the label's history list, every scalar aggregate
//! field, their TTLs and the discovery index in a single atomic keyspace
//! step, so readers either see all of an observation's effects or none of
//! them.
//!
//! The variance uses the textbook sum-of-squares estimator rather than
//! Welford: numerically less stable for large magnitudes, but it needs no
//! read of the previous aggregate beyond two running totals that the store
//! can increment in place.
//!
//! Observation values are deliberately not validated: a non-finite value is
//! written through and will poison avg/max/min until the label's keys age
//! out. Callers that care must guard upstream.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{Settings, RETENTION_TTL};
use crate::store::{Keyspace, StatStore};

use super::context::{hash_context, store_context};
use super::keys::{Field, StatKeys};
use super::types::StatDelta;
use super::StatsError;

/// One observation, as handed to the store's atomic step.
#[derive(Debug, Clone)]
pub(crate) struct RecordOp<'a> {
    pub namespace: &'a str,
    pub label: &'a str,
    pub value: f64,
    pub timestamp: f64,
    pub context_id: &'a str,
    pub history_size: usize,
    pub ttl: Duration,
}

/// Apply one observation to the keyspace. Runs inside `StatStore::atomic`.
pub(crate) fn apply_record(ks: &mut dyn Keyspace, op: &RecordOp<'_>) -> StatDelta {
    let ns = op.namespace;
    let label = op.label;

    let history_key = StatKeys::history(ns, label);
    ks.lpush(
        &history_key,
        format!("{};{};{}", op.timestamp, op.value, op.context_id),
    );
    ks.ltrim(&history_key, op.history_size);

    ks.set(
        &StatKeys::scalar(ns, Field::Last, label),
        op.value.to_string(),
    );
    ks.set(
        &StatKeys::scalar(ns, Field::LastTime, label),
        op.timestamp.to_string(),
    );

    let count = ks.incr(&StatKeys::scalar(ns, Field::Count, label));
    let total = ks.incr_by_float(&StatKeys::scalar(ns, Field::Total, label), op.value);
    let avg = total / count as f64;
    ks.set(&StatKeys::scalar(ns, Field::Avg, label), avg.to_string());

    let total_sq = ks.incr_by_float(
        &StatKeys::scalar(ns, Field::TotalSq, label),
        op.value * op.value,
    );
    let stdev = if count > 1 {
        let n = count as f64;
        (total_sq / (n - 1.0) - (n / (n - 1.0)) * avg * avg).sqrt()
    } else {
        0.0
    };
    ks.set(&StatKeys::scalar(ns, Field::Stdev, label), stdev.to_string());

    let max_key = StatKeys::scalar(ns, Field::Max, label);
    let max = match ks.get(&max_key).and_then(|s| s.parse::<f64>().ok()) {
        Some(prev) => prev.max(op.value),
        None => op.value,
    };
    ks.set(&max_key, max.to_string());

    let min_key = StatKeys::scalar(ns, Field::Min, label);
    let min = match ks.get(&min_key).and_then(|s| s.parse::<f64>().ok()) {
        Some(prev) => prev.min(op.value),
        None => op.value,
    };
    ks.set(&min_key, min.to_string());

    for field in [
        Field::Count,
        Field::Avg,
        Field::Stdev,
        Field::Max,
        Field::Min,
        Field::Total,
        Field::TotalSq,
        Field::Last,
        Field::LastTime,
    ] {
        ks.expire(&StatKeys::scalar(ns, field, label), op.ttl);
    }
    ks.expire(&history_key, op.ttl);

    ks.index_add(&StatKeys::index(ns), label);

    StatDelta {
        count,
        avg,
        stdev,
        max,
        min,
        total,
    }
}

/// Record one observation: run the atomic update, then store the context
/// payload (deduplicated by content hash) if one was given.
///
/// Returns the freshly computed scalar snapshot. Fails only when the store is
/// unreachable; never retried here.
pub fn write_stat(
    store: &dyn StatStore,
    settings: &Settings,
    timestamp: f64,
    label: &str,
    value: f64,
    context: Option<&str>,
) -> Result<StatDelta, StatsError> {
    let context_id = hash_context(context);
    let op = RecordOp {
        namespace: &settings.namespace,
        label,
        value,
        timestamp,
        context_id: &context_id,
        history_size: settings.history_size,
        ttl: RETENTION_TTL,
    };

    let mut delta = StatDelta::default();
    store.atomic(&mut |ks| {
        delta = apply_record(ks, &op);
    })?;

    if let Some(payload) = context {
        if !payload.is_empty() {
            store_context(store, &settings.namespace, &context_id, payload)?;
        }
    }

    Ok(delta)
}

/// Record one observation timestamped now.
pub fn push_stat(
    store: &dyn StatStore,
    settings: &Settings,
    label: &str,
    value: f64,
) -> Result<StatDelta, StatsError> {
    write_stat(store, settings, now_timestamp(), label, value, None)
}

/// Seconds since the Unix epoch, as a float.
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Replace characters that would collide with the line-protocol label
/// grammar. Commas, semicolons, equals signs and spaces map to underscores;
/// backslashes are dropped.
pub(crate) fn safe_string(value: &str) -> String {
    value
        .chars()
        .filter_map(|c| match c {
            ',' | ';' | '=' | ' ' => Some('_'),
            '\\' => None,
            other => Some(other),
        })
        .collect()
}

/// Append extra dimension labels to a label using the line-protocol
/// convention: `label;k=v,k=v`.
pub(crate) fn compose_label(label: &str, extra_labels: &[(&str, &str)]) -> String {
    if extra_labels.is_empty() {
        return label.to_string();
    }
    let suffix = extra_labels
        .iter()
        .map(|(k, v)| format!("{}={}", safe_string(k), safe_string(v)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{};{}", label, suffix)
}

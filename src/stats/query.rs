//! Read-back layer: aggregates, history and label discovery.

use tracing::{debug, warn};

use crate::config::Settings;
use crate::store::StatStore;

use super::keys::{Field, StatKeys};
use super::types::{parse_history_entry, value_to_float, HistoryEntry, StatSummary};
use super::StatsError;

/// Fetch a label's current aggregate.
///
/// When the canonical `TOTAL` field is absent the label is treated as never
/// observed or expired: the result is `NotFound` and, as a side effect, the
/// label is pruned from the discovery index. Index membership is advisory,
/// not authoritative, and this is its only cleanup path.
pub fn summary(
    store: &dyn StatStore,
    settings: &Settings,
    label: &str,
) -> Result<StatSummary, StatsError> {
    let keys: Vec<String> = Field::SUMMARY
        .iter()
        .map(|f| StatKeys::scalar(&settings.namespace, *f, label))
        .collect();
    let raw = store.get_many(&keys)?;
    let mut values = raw.iter().map(|v| value_to_float(v.as_deref()));
    let mut next = || values.next().flatten();

    let result = StatSummary {
        count: next(),
        avg: next(),
        stdev: next(),
        max: next(),
        min: next(),
        total: next(),
        last: next(),
        last_time: next(),
    };

    if result.total.is_none() {
        store.index_remove(&StatKeys::index(&settings.namespace), label)?;
        debug!(label, "aggregate absent, pruned label from discovery index");
        return Err(StatsError::NotFound);
    }

    Ok(result)
}

/// Fetch a label's raw observation history, newest first.
///
/// Unknown labels yield an empty list, not an error. Entries that fail to
/// decode are skipped with a warning; history is best-effort telemetry and
/// one bad entry must not fail the fetch.
pub fn history(
    store: &dyn StatStore,
    settings: &Settings,
    label: &str,
) -> Result<Vec<HistoryEntry>, StatsError> {
    let key = StatKeys::history(&settings.namespace, label);
    let raw = store.list_range(&key, settings.history_size)?;

    Ok(raw
        .iter()
        .filter_map(|entry| match parse_history_entry(label, entry) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(label, %err, "skipping undecodable history entry");
                None
            }
        })
        .collect())
}

/// List labels in the discovery index matching a Redis-style glob pattern.
///
/// The scan is finite and not restartable, and it may yield duplicate names
/// when the index changes under it; callers must tolerate duplicates. They
/// are deliberately not deduplicated here, since callers may rely on raw
/// scan cardinality for cost estimation.
pub fn labels(
    store: &dyn StatStore,
    settings: &Settings,
    pattern: &str,
) -> Result<Vec<String>, StatsError> {
    let index_key = StatKeys::index(&settings.namespace);
    Ok(store.index_scan(&index_key, pattern)?)
}

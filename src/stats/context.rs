//! Deduplicated context payload store.
//!
//! A context is an opaque payload attached to an observation (a stack trace,
//! a request snapshot). Payloads are keyed by content hash, so identical
//! payloads submitted by any number of observations collapse to one stored
//! copy; history entries reference the hash and never own the payload's
//! lifecycle. Every submission refreshes the payload's TTL whether or not it
//! was newly written.

use std::collections::HashMap;

use sha1::{Digest, Sha1};

use crate::config::{Settings, RETENTION_TTL};
use crate::store::StatStore;

use super::keys::StatKeys;
use super::StatsError;

/// Content hash of a context payload. Absent or empty payloads map to the
/// empty id, meaning "no context".
pub fn hash_context(context: Option<&str>) -> String {
    let payload = match context {
        Some(c) if !c.is_empty() => c,
        _ => return String::new(),
    };

    let mut hasher = Sha1::new();
    hasher.update(payload.as_bytes());
    let digest = hasher.finalize();

    let mut id = String::with_capacity(digest.len() * 2);
    for byte in digest {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}

/// Write a payload under its content hash unless already present, refreshing
/// the TTL either way.
pub(crate) fn store_context(
    store: &dyn StatStore,
    namespace: &str,
    context_id: &str,
    payload: &str,
) -> Result<(), StatsError> {
    let key = StatKeys::context(namespace, context_id);
    store.set_if_absent(&key, payload, RETENTION_TTL)?;
    Ok(())
}

/// Fetch context payloads by id. Ids that resolve to nothing are silently
/// omitted from the result; asking for an unknown id is not an error.
pub fn contexts(
    store: &dyn StatStore,
    settings: &Settings,
    context_ids: &[String],
) -> Result<HashMap<String, String>, StatsError> {
    let keys: Vec<String> = context_ids
        .iter()
        .map(|id| StatKeys::context(&settings.namespace, id))
        .collect();
    let values = store.get_many(&keys)?;

    Ok(context_ids
        .iter()
        .zip(values)
        .filter_map(|(id, value)| value.map(|v| (id.clone(), v)))
        .collect())
}

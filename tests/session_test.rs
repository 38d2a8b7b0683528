//! Recording session integration tests.
//!
//! Verifies the buffering and flush contract shared by the blocking and
//! async sessions: nothing is written before flush, insertion order is
//! preserved, and a failed scope records one implicit error observation
//! before propagating the caller's error.

use std::sync::Arc;

use statkeeper::stats::{history, labels, summary};
use statkeeper::{AsyncStats, MemoryStore, Settings, StatStore, Stats, StatsError};

#[derive(Debug)]
struct ValueError(String);

impl std::fmt::Display for ValueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValueError {}

fn setup() -> (Arc<MemoryStore>, Settings) {
    (
        Arc::new(MemoryStore::new()),
        Settings::with_namespace("TEST-SESSION"),
    )
}

// ============================================================================
// Blocking session
// ============================================================================

#[test]
fn test_nothing_written_before_flush() {
    let (store, settings) = setup();
    let mut stats = Stats::new(store.clone(), settings.clone());

    stats.stat("buffered", 1.0);
    stats.stat("buffered", 2.0);
    assert_eq!(stats.len(), 2);
    assert!(labels(&*store, &settings, "*").unwrap().is_empty());

    stats.flush().unwrap();
    assert!(stats.is_empty());
    let stat = summary(&*store, &settings, "buffered").unwrap();
    assert_eq!(stat.count, Some(2.0));
}

#[test]
fn test_scope_success_flushes_all() {
    let (store, settings) = setup();

    let result: Result<u32, ValueError> =
        Stats::scope(store.clone(), settings.clone(), |stats| {
            for i in 0..3 {
                stats.stat("work", i as f64);
            }
            Ok(7)
        });

    assert_eq!(result.unwrap(), 7);
    let stat = summary(&*store, &settings, "work").unwrap();
    assert_eq!(stat.count, Some(3.0));
    assert_eq!(stat.total, Some(3.0));
}

#[test]
fn test_failed_scope_flushes_buffer_plus_implicit_error() {
    let (store, settings) = setup();

    let result: Result<(), ValueError> =
        Stats::scope(store.clone(), settings.clone(), |stats| {
            stats.stat("partial", 1.0);
            stats.stat("partial", 2.0);
            Err(ValueError("boom".to_string()))
        });

    assert_eq!(result.unwrap_err().to_string(), "boom");

    // Both buffered observations landed.
    let stat = summary(&*store, &settings, "partial").unwrap();
    assert_eq!(stat.count, Some(2.0));

    // Plus exactly one implicit observation tagging the error type.
    let err_stat = summary(&*store, &settings, "errors__EXC:ValueError").unwrap();
    assert_eq!(err_stat.count, Some(1.0));
    assert_eq!(err_stat.last, Some(1.0));

    let mut discovered = labels(&*store, &settings, "*").unwrap();
    discovered.sort();
    assert_eq!(discovered, vec!["errors__EXC:ValueError", "partial"]);
}

#[test]
fn test_error_observation_carries_display_as_context() {
    let (store, settings) = setup();

    let _: Result<(), ValueError> = Stats::scope(store.clone(), settings.clone(), |stats| {
        stats.stat("x", 1.0);
        Err(ValueError("exploded while polling".to_string()))
    });

    let entries = history(&*store, &settings, "errors__EXC:ValueError").unwrap();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].context_id.is_empty());

    let contexts = statkeeper::stats::contexts(
        &*store,
        &settings,
        &[entries[0].context_id.clone()],
    )
    .unwrap();
    assert_eq!(
        contexts.get(&entries[0].context_id).map(String::as_str),
        Some("exploded while polling")
    );
}

#[test]
fn test_explicit_error_labels() {
    let (store, settings) = setup();
    let mut stats = Stats::new(store.clone(), settings.clone());

    stats.error(&["timeout", "upstream:dns"], None);
    stats.flush().unwrap();

    assert!(summary(&*store, &settings, "errors__timeout").is_ok());
    assert!(summary(&*store, &settings, "errors__upstream:dns").is_ok());
}

#[test]
fn test_extra_labels_reach_storage_label() {
    let (store, settings) = setup();
    let mut stats = Stats::new(store.clone(), settings.clone());

    stats.stat_with("POLLER", 0.25, None, &[("host", "web01")]);
    stats.flush().unwrap();

    assert!(summary(&*store, &settings, "POLLER;host=web01").is_ok());
}

#[test]
fn test_drop_flushes_best_effort() {
    let (store, settings) = setup();
    {
        let mut stats = Stats::new(store.clone(), settings.clone());
        stats.stat("dropped", 5.0);
    }
    let stat = summary(&*store, &settings, "dropped").unwrap();
    assert_eq!(stat.count, Some(1.0));
}

// ============================================================================
// Flush failure surfacing
// ============================================================================

/// Store that refuses every operation, for exercising failure paths.
struct DownStore;

impl StatStore for DownStore {
    fn atomic(
        &self,
        _step: &mut dyn FnMut(&mut dyn statkeeper::store::Keyspace),
    ) -> Result<(), statkeeper::StoreError> {
        Err(statkeeper::StoreError::Unavailable("down".to_string()))
    }

    fn get_many(
        &self,
        _keys: &[String],
    ) -> Result<Vec<Option<String>>, statkeeper::StoreError> {
        Err(statkeeper::StoreError::Unavailable("down".to_string()))
    }

    fn set_if_absent(
        &self,
        _key: &str,
        _value: &str,
        _ttl: std::time::Duration,
    ) -> Result<bool, statkeeper::StoreError> {
        Err(statkeeper::StoreError::Unavailable("down".to_string()))
    }

    fn list_range(
        &self,
        _key: &str,
        _limit: usize,
    ) -> Result<Vec<String>, statkeeper::StoreError> {
        Err(statkeeper::StoreError::Unavailable("down".to_string()))
    }

    fn index_remove(&self, _key: &str, _member: &str) -> Result<(), statkeeper::StoreError> {
        Err(statkeeper::StoreError::Unavailable("down".to_string()))
    }

    fn index_scan(
        &self,
        _key: &str,
        _pattern: &str,
    ) -> Result<Vec<String>, statkeeper::StoreError> {
        Err(statkeeper::StoreError::Unavailable("down".to_string()))
    }
}

#[test]
fn test_flush_surfaces_storage_failure() {
    let mut stats = Stats::new(Arc::new(DownStore), Settings::with_namespace("NS"));
    stats.stat("doomed", 1.0);

    let err = stats.flush().unwrap_err();
    assert!(matches!(err, StatsError::Storage(_)));
    // The buffer is not replayed; nothing retries internally.
    assert!(stats.is_empty());
}

#[test]
fn test_failed_scope_still_returns_callers_error() {
    let result: Result<(), ValueError> = Stats::scope(
        Arc::new(DownStore),
        Settings::with_namespace("NS"),
        |stats| {
            stats.stat("doomed", 1.0);
            Err(ValueError("original".to_string()))
        },
    );

    // The caller's error wins over the flush failure.
    assert_eq!(result.unwrap_err().to_string(), "original");
}

// ============================================================================
// Async session
// ============================================================================

#[tokio::test]
async fn test_async_session_shares_flush_contract() {
    let (store, settings) = setup();
    let mut stats = AsyncStats::new(store.clone(), settings.clone());

    stats.stat("async.work", 1.5);
    stats.stat("async.work", 2.5);
    assert!(labels(&*store, &settings, "*").unwrap().is_empty());

    stats.flush().await.unwrap();

    let stat = summary(&*store, &settings, "async.work").unwrap();
    assert_eq!(stat.count, Some(2.0));
    assert_eq!(stat.total, Some(4.0));
}

#[tokio::test]
async fn test_async_complete_records_implicit_error() {
    let (store, settings) = setup();
    let stats = AsyncStats::new(store.clone(), settings.clone());

    let outcome: Result<(), ValueError> = Err(ValueError("async boom".to_string()));
    let result = stats.complete(outcome).await;
    assert!(result.is_err());

    let err_stat = summary(&*store, &settings, "errors__EXC:ValueError").unwrap();
    assert_eq!(err_stat.count, Some(1.0));
}

#[tokio::test]
async fn test_async_complete_success_flushes() {
    let (store, settings) = setup();
    let mut stats = AsyncStats::new(store.clone(), settings.clone());

    stats.stat_with("async.job", 9.0, Some("payload"), &[("env", "prod")]);
    let result: Result<(), ValueError> = stats.complete(Ok(())).await;
    assert!(result.is_ok());

    assert!(summary(&*store, &settings, "async.job;env=prod").is_ok());
}

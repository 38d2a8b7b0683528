//! Scoped recording sessions.
//!
//! Observations are buffered in memory for the session's lifetime (each
//! timestamped when buffered, not when flushed) and written as independent
//! atomic per-observation updates, in insertion order, when the session
//! completes. A failed scope records one implicit error observation tagging
//! the error type before flushing, then propagates the original error.
//!
//! `Stats` is the blocking session for worker threads; `AsyncStats` is the
//! same contract for an event loop. With the bundled in-memory store every
//! flush step completes without yielding; a networked store implementation
//! awaits its transport inside `StatStore` instead.
//!
//! Try not to hold a large number of observations in one session.

use std::sync::Arc;

use tracing::warn;

use crate::config::Settings;
use crate::store::StatStore;

use super::engine::{compose_label, now_timestamp, write_stat};
use super::StatsError;

const ERROR_LABEL_PREFIX: &str = "errors__";

/// One buffered observation.
#[derive(Debug, Clone)]
struct Observation {
    timestamp: f64,
    label: String,
    value: f64,
    context: Option<String>,
}

/// Recording buffer shared by both session flavors.
#[derive(Debug, Default)]
struct Buffer {
    observations: Vec<Observation>,
}

impl Buffer {
    fn stat(
        &mut self,
        label: &str,
        value: f64,
        context: Option<&str>,
        extra_labels: &[(&str, &str)],
    ) {
        self.observations.push(Observation {
            timestamp: now_timestamp(),
            label: compose_label(label, extra_labels),
            value,
            context: context.map(str::to_string),
        });
    }

    fn error(&mut self, labels: &[&str], context: Option<&str>) {
        for label in labels {
            let label = format!("{ERROR_LABEL_PREFIX}{label}");
            self.stat(&label, 1.0, context, &[]);
        }
    }

    fn exception<E: std::error::Error + ?Sized>(&mut self, err: &E) {
        let label = format!("EXC:{}", error_type_name::<E>());
        let context = err.to_string();
        self.error(&[&label], Some(&context));
    }
}

/// Short type name of an error, without its module path.
fn error_type_name<E: ?Sized>() -> &'static str {
    let full = std::any::type_name::<E>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Flush buffered observations as independent per-observation updates.
///
/// Every observation is attempted even after a failure (no update depends on
/// the one before it); the first error is reported once all dispatches ran.
/// Nothing is retried and the buffer is not replayed.
fn flush_buffer(
    store: &dyn StatStore,
    settings: &Settings,
    observations: Vec<Observation>,
) -> Result<(), StatsError> {
    let mut first_error = None;
    for obs in observations {
        let result = write_stat(
            store,
            settings,
            obs.timestamp,
            &obs.label,
            obs.value,
            obs.context.as_deref(),
        );
        if let Err(err) = result {
            warn!(label = %obs.label, %err, "failed to record observation");
            if first_error.is_none() {
                first_error = Some(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Blocking recording session.
///
/// ```
/// use statkeeper::{MemoryStore, Settings, Stats};
/// use std::sync::Arc;
///
/// let store: Arc<dyn statkeeper::StatStore> = Arc::new(MemoryStore::new());
/// let outcome: Result<(), std::io::Error> =
///     Stats::scope(store, Settings::default(), |stats| {
///         stats.stat("job.duration", 1.25);
///         Ok(())
///     });
/// assert!(outcome.is_ok());
/// ```
pub struct Stats {
    store: Arc<dyn StatStore>,
    settings: Settings,
    buffer: Buffer,
}

impl Stats {
    pub fn new(store: Arc<dyn StatStore>, settings: Settings) -> Self {
        Stats {
            store,
            settings,
            buffer: Buffer::default(),
        }
    }

    /// Buffer one observation, timestamped now.
    pub fn stat(&mut self, label: &str, value: f64) {
        self.buffer.stat(label, value, None, &[]);
    }

    /// Buffer one observation with a context payload and extra dimension
    /// labels appended in line-protocol form.
    pub fn stat_with(
        &mut self,
        label: &str,
        value: f64,
        context: Option<&str>,
        extra_labels: &[(&str, &str)],
    ) {
        self.buffer.stat(label, value, context, extra_labels);
    }

    /// Buffer one error observation (value 1.0) per given label, each under
    /// the `errors__` prefix.
    pub fn error(&mut self, labels: &[&str], context: Option<&str>) {
        self.buffer.error(labels, context);
    }

    /// Buffer one error observation tagging the error's type:
    /// `errors__EXC:{TypeName}`, with the error's display as context.
    pub fn exception<E: std::error::Error + ?Sized>(&mut self, err: &E) {
        self.buffer.exception(err);
    }

    /// Number of buffered observations.
    pub fn len(&self) -> usize {
        self.buffer.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.observations.is_empty()
    }

    /// Write all buffered observations now.
    pub fn flush(&mut self) -> Result<(), StatsError> {
        let observations = std::mem::take(&mut self.buffer.observations);
        flush_buffer(&*self.store, &self.settings, observations)
    }

    /// Finish the session with a work outcome. An `Err` outcome first buffers
    /// the implicit error observation, then the buffer is flushed either way
    /// and the outcome passed through. Flush failures are logged, not
    /// returned: the caller's own error wins.
    pub fn complete<T, E: std::error::Error>(mut self, outcome: Result<T, E>) -> Result<T, E> {
        if let Err(ref err) = outcome {
            self.exception(err);
        }
        if let Err(flush_err) = self.flush() {
            warn!(%flush_err, "failed to flush stats session");
        }
        outcome
    }

    /// Run `f` inside a fresh session and complete it with `f`'s outcome.
    pub fn scope<T, E, F>(store: Arc<dyn StatStore>, settings: Settings, f: F) -> Result<T, E>
    where
        E: std::error::Error,
        F: FnOnce(&mut Stats) -> Result<T, E>,
    {
        let mut stats = Stats::new(store, settings);
        let outcome = f(&mut stats);
        stats.complete(outcome)
    }
}

impl Drop for Stats {
    fn drop(&mut self) {
        if self.buffer.observations.is_empty() {
            return;
        }
        // Best effort: a dropped session still flushes, but can only log.
        if let Err(err) = self.flush() {
            warn!(%err, "failed to flush stats session on drop");
        }
    }
}

/// Recording session for a cooperative event loop. Identical buffering and
/// flush contract to [`Stats`].
///
/// Dropping an `AsyncStats` with unflushed observations only warns: flushing
/// needs an `await`, so call [`AsyncStats::complete`] or
/// [`AsyncStats::flush`] before letting it go.
pub struct AsyncStats {
    store: Arc<dyn StatStore>,
    settings: Settings,
    buffer: Buffer,
}

impl AsyncStats {
    pub fn new(store: Arc<dyn StatStore>, settings: Settings) -> Self {
        AsyncStats {
            store,
            settings,
            buffer: Buffer::default(),
        }
    }

    /// Buffer one observation, timestamped now.
    pub fn stat(&mut self, label: &str, value: f64) {
        self.buffer.stat(label, value, None, &[]);
    }

    /// Buffer one observation with a context payload and extra dimension
    /// labels appended in line-protocol form.
    pub fn stat_with(
        &mut self,
        label: &str,
        value: f64,
        context: Option<&str>,
        extra_labels: &[(&str, &str)],
    ) {
        self.buffer.stat(label, value, context, extra_labels);
    }

    /// Buffer one error observation (value 1.0) per given label, each under
    /// the `errors__` prefix.
    pub fn error(&mut self, labels: &[&str], context: Option<&str>) {
        self.buffer.error(labels, context);
    }

    /// Buffer one error observation tagging the error's type:
    /// `errors__EXC:{TypeName}`, with the error's display as context.
    pub fn exception<E: std::error::Error + ?Sized>(&mut self, err: &E) {
        self.buffer.exception(err);
    }

    /// Number of buffered observations.
    pub fn len(&self) -> usize {
        self.buffer.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.observations.is_empty()
    }

    /// Write all buffered observations now.
    pub async fn flush(&mut self) -> Result<(), StatsError> {
        let observations = std::mem::take(&mut self.buffer.observations);
        flush_buffer(&*self.store, &self.settings, observations)
    }

    /// Finish the session with a work outcome; see [`Stats::complete`].
    pub async fn complete<T, E: std::error::Error>(mut self, outcome: Result<T, E>) -> Result<T, E> {
        if let Err(ref err) = outcome {
            self.exception(err);
        }
        if let Err(flush_err) = self.flush().await {
            warn!(%flush_err, "failed to flush stats session");
        }
        outcome
    }
}

impl Drop for AsyncStats {
    fn drop(&mut self) {
        let pending = self.buffer.observations.len();
        if pending > 0 {
            warn!(pending, "async stats session dropped with unflushed observations");
        }
    }
}

//! Prometheus-style exposition of stored aggregates.
//!
//! Labels can encode their dimensions two ways:
//!
//! - line protocol: `SNMP_POLLER;hostname=nl-ams01` or
//!   `SNMP_WORKER;ip=10.0.0.1,oid=sysName` - prefix, then `k=v` pairs
//! - error convention: `errors__EXC:ValueError` - `__`-separated `k:v` pairs
//!
//! A formatter turns one `(label, aggregate)` pair into zero or more metric
//! lines. The registry dispatches by label prefix: prefixes are tried in
//! registration order and the first literal match wins; labels matching no
//! registered prefix fall through to the default line-protocol formatter.
//! First-match-wins over registration order is load-bearing for overlapping
//! prefixes, so register the more specific prefix first.

use std::sync::Arc;

use tracing::debug;

use crate::config::Settings;
use crate::stats::{labels, summary, Field, StatSummary, StatsError};
use crate::store::StatStore;

/// Formatter callback: `(label, aggregate) -> metric lines` (without
/// trailing newlines).
pub type Formatter = Box<dyn Fn(&str, &StatSummary) -> Vec<String> + Send + Sync>;

/// Prefix-dispatched formatter registry with a mandatory default.
pub struct FormatterRegistry {
    entries: Vec<(String, Formatter)>,
    default: Formatter,
}

impl FormatterRegistry {
    /// Registry with the stock formatters: the line-protocol default, plus
    /// the `errors__` formatter reporting error counts under
    /// `{NAMESPACE_UPPER}_ERROR`.
    pub fn with_defaults(namespace: &str) -> Self {
        let error_prefix = format!("{}_ERROR", namespace.to_uppercase());
        let mut registry = FormatterRegistry {
            entries: Vec::new(),
            default: Box::new(line_protocol_formatter),
        };
        registry.register(
            "errors__",
            Box::new(move |label, stat| error_formatter(&error_prefix, label, stat)),
        );
        registry
    }

    /// Registry with only the line-protocol default formatter.
    pub fn bare() -> Self {
        FormatterRegistry {
            entries: Vec::new(),
            default: Box::new(line_protocol_formatter),
        }
    }

    /// Register a formatter for labels starting with `prefix`. Dispatch tries
    /// prefixes in registration order; first match wins.
    pub fn register(&mut self, prefix: impl Into<String>, formatter: Formatter) {
        self.entries.push((prefix.into(), formatter));
    }

    /// Replace the default (wildcard) formatter.
    pub fn set_default(&mut self, formatter: Formatter) {
        self.default = formatter;
    }

    /// Format one label's aggregate through the first matching formatter.
    pub fn format(&self, label: &str, stat: &StatSummary) -> Vec<String> {
        for (prefix, formatter) in &self.entries {
            if label.starts_with(prefix.as_str()) {
                return formatter(label, stat);
            }
        }
        (self.default)(label, stat)
    }
}

/// Escape a label value for the exposition grammar. Order matters: escaping
/// backslashes first avoids double-escaping the sequences added after.
pub fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\\n")
        .replace('"', "\\\"")
}

/// Render a label set as `{k="v",...}`, or nothing when empty.
fn render_labels(label_pairs: &[(String, String)]) -> String {
    if label_pairs.is_empty() {
        return String::new();
    }
    let inner = label_pairs
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_value(v)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{}}}", inner)
}

/// Render a float the way it was stored: integral values keep a trailing
/// `.0` so `1` and `1.0` read the same across exports.
fn format_value(value: f64) -> String {
    format!("{value:?}")
}

/// Emit one metric line per requested aggregate field, shaped
/// `{prefix}_{FIELD}{labels} {value}`. Absent fields are omitted entirely,
/// and `last_time` never appears: it is bookkeeping, not a metric.
pub fn metric_lines(
    label_pairs: &[(String, String)],
    stat: &StatSummary,
    prefix: &str,
    fields: &[Field],
) -> Vec<String> {
    let rendered = render_labels(label_pairs);
    fields
        .iter()
        .filter(|f| **f != Field::LastTime)
        .filter_map(|f| {
            stat.field(*f)
                .map(|v| format!("{}_{}{} {}", prefix, f.key_part(), rendered, format_value(v)))
        })
        .collect()
}

/// Parse a line-protocol label into its prefix and `k=v` pairs.
///
/// `SNMP_WORKER;hostname=abc.com,worker=snmp-mti` becomes
/// `("SNMP_WORKER", [("hostname", "abc.com"), ("worker", "snmp-mti")])`.
/// Labels that do not fit the grammar come back whole with no pairs.
pub fn parse_line_protocol_label(label: &str) -> (String, Vec<(String, String)>) {
    let Some((prefix, raw_pairs)) = label.split_once(';') else {
        return (label.to_string(), Vec::new());
    };

    let mut pairs = Vec::new();
    for raw in raw_pairs.split(',') {
        match raw.split_once('=') {
            Some((k, v)) => pairs.push((k.to_string(), v.to_string())),
            None => return (label.to_string(), Vec::new()),
        }
    }
    (prefix.to_string(), pairs)
}

/// Default formatter: line-protocol label, all reportable fields.
fn line_protocol_formatter(label: &str, stat: &StatSummary) -> Vec<String> {
    let (prefix, pairs) = parse_line_protocol_label(label);
    metric_lines(&pairs, stat, &prefix, &Field::REPORTABLE)
}

/// Formatter for `errors__`-prefixed labels: the remainder splits on `__`
/// into `key:value` pairs; a piece without the delimiter degrades the whole
/// label to a single `error` dimension. Only the count is reported.
fn error_formatter(metric_prefix: &str, label: &str, stat: &StatSummary) -> Vec<String> {
    let pieces: Vec<&str> = label.split("__").skip(1).collect();

    let mut pairs = Vec::new();
    for piece in &pieces {
        match piece.split_once(':') {
            Some((k, v)) => pairs.push((k.to_string(), v.to_string())),
            None => {
                pairs = match pieces.last() {
                    Some(last) => vec![("error".to_string(), last.to_string())],
                    None => Vec::new(),
                };
                break;
            }
        }
    }

    metric_lines(&pairs, stat, metric_prefix, &[Field::Count])
}

/// Renders every discovered label's aggregate as exposition text.
pub struct Exporter {
    store: Arc<dyn StatStore>,
    settings: Settings,
    registry: FormatterRegistry,
}

impl Exporter {
    pub fn new(store: Arc<dyn StatStore>, settings: Settings) -> Self {
        let registry = FormatterRegistry::with_defaults(&settings.namespace);
        Exporter {
            store,
            settings,
            registry,
        }
    }

    /// Access the registry to add project-specific formatters.
    pub fn registry_mut(&mut self) -> &mut FormatterRegistry {
        &mut self.registry
    }

    /// Lazily yield one line (with trailing newline) per metric of every
    /// label matching `pattern`.
    ///
    /// A label whose aggregate vanished between discovery and fetch - a race
    /// with expiry - yields nothing; per-label failures never poison the
    /// stream. Only the initial index scan can fail.
    pub fn export(
        &self,
        pattern: &str,
    ) -> Result<impl Iterator<Item = String> + '_, StatsError> {
        let names = labels(&*self.store, &self.settings, pattern)?;

        Ok(names.into_iter().flat_map(move |label| {
            match summary(&*self.store, &self.settings, &label) {
                Ok(stat) => self
                    .registry
                    .format(&label, &stat)
                    .into_iter()
                    .map(|line| line + "\n")
                    .collect::<Vec<_>>(),
                Err(err) => {
                    debug!(label, %err, "skipping label during export");
                    Vec::new()
                }
            }
        }))
    }
}

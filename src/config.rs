//! Engine configuration.
//!
//! Configuration is loaded from environment variables:
//!
//! - `STATKEEPER_NAMESPACE`: key prefix scoping one logical deployment
//!   (default: `STATKEEPER`)
//! - `STATKEEPER_HISTORY_SIZE`: bounded length of each label's raw
//!   observation history (default: 1000)
//!
//! The retention window is a fixed constant rather than a setting: the atomic
//! record step bakes the TTL into every key it touches, and mixing windows
//! within one namespace would leave aggregates outliving their histories.

use std::time::Duration;

const ENV_PREFIX: &str = "STATKEEPER";

/// How long an unobserved label's keys survive before expiring (14 days).
pub const RETENTION_TTL: Duration = Duration::from_secs(1_209_600);

/// Default bounded length of each label's observation history.
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Runtime settings for the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Key prefix scoping all entries of one logical deployment.
    pub namespace: String,
    /// Maximum number of retained history entries per label.
    pub history_size: usize,
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let namespace = std::env::var(format!("{ENV_PREFIX}_NAMESPACE"))
            .unwrap_or_else(|_| ENV_PREFIX.to_string());
        let history_size = std::env::var(format!("{ENV_PREFIX}_HISTORY_SIZE"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_HISTORY_SIZE);

        Settings {
            namespace,
            history_size,
        }
    }

    /// Settings with the given namespace and default history size.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Settings {
            namespace: namespace.into(),
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            namespace: ENV_PREFIX.to_string(),
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

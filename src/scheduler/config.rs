//! Worker configuration.

use crate::task::domain::TaskKind;
use std::time::Duration;

/// Environment variable overriding the idle poll interval, in milliseconds.
pub const POLL_INTERVAL_ENV: &str = "LEXICON_POLL_INTERVAL_MS";

/// Environment variable disabling the worker when set to `false` or `0`.
pub const WORKER_ENABLED_ENV: &str = "LEXICON_WORKER_ENABLED";

/// Configuration for one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Queue served by the worker.
    pub kind: TaskKind,
    /// Sleep between polls when the queue is empty or a tick failed.
    pub poll_interval: Duration,
    /// Whether the run loop processes tasks at all.
    pub enabled: bool,
}

impl WorkerConfig {
    /// Default configuration for a kind.
    #[must_use]
    pub const fn for_kind(kind: TaskKind) -> Self {
        Self {
            kind,
            poll_interval: kind.default_poll_interval(),
            enabled: true,
        }
    }

    /// Reads overrides from the process environment.
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `LEXICON_WORKER_ENABLED` | `true` | Enable or disable task processing |
    /// | `LEXICON_POLL_INTERVAL_MS` | per kind | Idle poll interval |
    #[must_use]
    pub fn from_env(kind: TaskKind) -> Self {
        Self::from_lookup(kind, |name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`. Unparseable values fall back to the
    /// defaults.
    #[must_use]
    pub fn from_lookup<F>(kind: TaskKind, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::for_kind(kind);
        let enabled = lookup(WORKER_ENABLED_ENV)
            .map_or(defaults.enabled, |value| value != "false" && value != "0");
        let poll_interval = lookup(POLL_INTERVAL_ENV)
            .and_then(|value| value.parse::<u64>().ok())
            .map_or(defaults.poll_interval, Duration::from_millis);

        Self {
            kind,
            poll_interval,
            enabled,
        }
    }

    /// Sets the idle poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Enables or disables task processing.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

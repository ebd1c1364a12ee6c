//! Task kinds served by the scheduler.

use super::ParseTaskKindError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Category of queued work. Each kind has its own table and handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Keyword filter over the literature corpus.
    Filter,
    /// Embedding training on a filtered dataset.
    Train,
}

impl TaskKind {
    /// All kinds in a stable order.
    pub const ALL: [Self; 2] = [Self::Filter, Self::Train];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Train => "train",
        }
    }

    /// Default idle poll interval for a worker serving this kind.
    ///
    /// Filter work is short so its queue is polled every second; training
    /// runs for minutes to hours and is polled every ten seconds.
    #[must_use]
    pub const fn default_poll_interval(self) -> Duration {
        match self {
            Self::Filter => Duration::from_secs(1),
            Self::Train => Duration::from_secs(10),
        }
    }
}

impl TryFrom<&str> for TaskKind {
    type Error = ParseTaskKindError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "filter" => Ok(Self::Filter),
            "train" => Ok(Self::Train),
            _ => Err(ParseTaskKindError(value.to_owned())),
        }
    }
}

impl FromStr for TaskKind {
    type Err = ParseTaskKindError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(value)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

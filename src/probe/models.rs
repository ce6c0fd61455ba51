//! Probe data models

use crate::probe::stats::StatsSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one dispatch, the only thing the dispatcher hands back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub available: bool,
    pub message: String,
}

impl ProbeResult {
    pub fn available() -> Self {
        Self {
            available: true,
            message: "Available".to_string(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            message: message.into(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Cancelled from outside
    Stopped,
    /// Every candidate source ran dry
    Exhausted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Stopped => write!(f, "stopped"),
            RunOutcome::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// Everything a run reports to its consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProbeEvent {
    /// A candidate was dispatched
    Checked {
        candidate: String,
        kind: String,
        result: ProbeResult,
    },
    /// A candidate turned out to be available
    Hit { candidate: String, kind: String },
    /// A source reported exhaustion and was dropped from the run
    SourceExhausted { kind: String },
    Stats(StatsSnapshot),
    /// Result of the hit notification for a candidate
    Notified { candidate: String, delivered: bool },
    Finished(RunOutcome),
}

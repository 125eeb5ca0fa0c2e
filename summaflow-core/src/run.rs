//! Per-process run context.
//!
//! A single UTC timestamp namespaces every artifact produced by one run. It is
//! computed once at start-up and handed to the configuration manager and the
//! pipeline explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Format used for run timestamps, e.g. `2025_03_01T12_30_05Z`.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y_%m_%dT%H_%M_%SZ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    timestamp: String,
    started_at: DateTime<Utc>,
}

impl RunContext {
    /// Capture the current UTC time as this run's identity.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(started_at: DateTime<Utc>) -> Self {
        Self {
            timestamp: started_at.format(RUN_TIMESTAMP_FORMAT).to_string(),
            started_at,
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.timestamp)
    }
}

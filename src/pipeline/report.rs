//! Outcome of one adapter run

use serde::Serialize;
use std::fmt;

use crate::error::Error;

/// Pipeline stage an item failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Enumerating remote locations for a key
    Discover,
    /// Fetching a location's bytes
    Retrieve,
    /// Turning staged bytes into the artifact
    Transform,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Discover => "discover",
            Stage::Retrieve => "retrieve",
            Stage::Transform => "transform",
        })
    }
}

/// An item that was reported and dropped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Stage the item was dropped in
    pub stage: Stage,
    /// Rendered time key or remote location
    pub item: String,
    /// Machine-readable error code (see [`Error::code`])
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
}

impl ItemFailure {
    pub(crate) fn new(stage: Stage, item: impl Into<String>, error: &Error) -> Self {
        Self {
            stage,
            item: item.into(),
            code: error.code(),
            message: error.to_string(),
        }
    }
}

/// Counters and failures for one adapter run
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Adapter name
    pub adapter: String,
    /// Keys produced by interval decomposition
    pub candidates: usize,
    /// Keys not yet present locally
    pub pending: usize,
    /// Locations discovered
    pub discovered: usize,
    /// Locations retrieved and staged
    pub retrieved: usize,
    /// Artifacts written
    pub transformed: usize,
    /// Items reported and dropped
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    pub(crate) fn new(adapter: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            ..Self::default()
        }
    }

    /// True when every discovered location became an artifact
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.transformed == self.discovered
    }

    /// Failures recorded for `stage`
    pub fn failures_in(&self, stage: Stage) -> impl Iterator<Item = &ItemFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }
}

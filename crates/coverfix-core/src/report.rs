//! Run identity, lifecycle states, and outcome counters

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate a new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one backfill run
///
/// Per-record failures never leave `Iterating`; only fatal failures before
/// or during iteration reach `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Nothing started yet
    Idle,
    /// Establishing tunnel and/or store connection
    Connecting,
    /// Computing the candidate count
    Counting,
    /// Walking the candidate cursor
    Iterating,
    /// Cursor exhausted, emitting the summary
    Draining,
    /// Terminal: completed
    Closed,
    /// Terminal: fatal failure
    Aborted,
}

impl RunState {
    /// Whether the run can make no further progress
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Counting => "counting",
            Self::Iterating => "iterating",
            Self::Draining => "draining",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Running counters for one backfill run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Records matching the candidate predicate at count time
    pub candidates: u64,
    /// Dimensions derived and persisted
    pub updated: u64,
    /// Rule-1 skips (no usable URL)
    pub skipped_no_url: u64,
    /// Rule-2 skips (direct video)
    pub skipped_video: u64,
    /// HTTP or network fetch failures
    pub fetch_failures: u64,
    /// Undecodable payloads
    pub decode_failures: u64,
    /// Records deleted between selection and update
    pub vanished: u64,
}

impl RunReport {
    /// Records skipped by either rule
    #[inline]
    #[must_use]
    pub fn skipped(&self) -> u64 {
        self.skipped_no_url + self.skipped_video
    }

    /// Records that failed fetch, decode, or persistence
    #[inline]
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.fetch_failures + self.decode_failures + self.vanished
    }

    /// Records the loop handled, whatever the outcome
    #[inline]
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.updated + self.skipped() + self.failed()
    }
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.candidates == 0 {
            return f.write_str("no records needed repair");
        }
        write!(
            f,
            "{} candidates: {} updated, {} skipped, {} failed",
            self.candidates,
            self.updated,
            self.skipped(),
            self.failed()
        )
    }
}

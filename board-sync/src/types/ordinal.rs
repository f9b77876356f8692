//! Ordinal and version stamps used to order and track board entities.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Sort key of a card within its lane, or of a lane within the board.
///
/// Ordinals are gap-tolerant floating point values: inserting between two
/// neighbors takes their midpoint, so a move never renumbers the lane until
/// the gap can no longer be subdivided.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ordinal(f64);

impl Ordinal {
    /// Ordinal of the first card placed in an empty lane
    pub const BASELINE: Ordinal = Ordinal(0.0);

    /// Create an ordinal from a raw value
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether the value can participate in ordering (not NaN or infinite)
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl PartialEq for Ordinal {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ordinal {}

impl PartialOrd for Ordinal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ordinal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Default for Ordinal {
    fn default() -> Self {
        Self::BASELINE
    }
}

impl From<f64> for Ordinal {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<i32> for Ordinal {
    fn from(value: i32) -> Self {
        Self(f64::from(value))
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic version counter of a card or lane.
///
/// Bumped on every committed mutation, local or remote.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Create a version from a raw counter
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw counter
    pub fn get(self) -> u64 {
        self.0
    }

    /// The version following this one
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

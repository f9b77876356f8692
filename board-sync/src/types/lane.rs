//! Lane types: Lane and its advisory capacity status

use super::ids::LaneId;
use super::ordinal::{Ordinal, Version};
use serde::{Deserialize, Serialize};

/// A lane (column) defines a workflow stage on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneId,
    pub name: String,
    /// Position among lanes, left to right
    pub ordinal: Ordinal,
    /// Advisory WIP limit. Reaching it is flagged, never enforced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default)]
    pub version: Version,
}

impl Lane {
    /// Create a new lane with the given id, name and ordinal
    pub fn new(
        id: impl Into<LaneId>,
        name: impl Into<String>,
        ordinal: impl Into<Ordinal>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ordinal: ordinal.into(),
            capacity: None,
            color: None,
            version: Version::default(),
        }
    }

    /// Set the WIP limit
    pub fn with_capacity(mut self, limit: usize) -> Self {
        self.capacity = Some(limit);
        self
    }

    /// Set the display color
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Set the version stamp
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Version::new(version);
        self
    }

    /// Capacity status for a lane holding `count` cards
    pub fn capacity_status(&self, count: usize) -> CapacityStatus {
        CapacityStatus::evaluate(self.capacity, count)
    }
}

/// How full a lane is relative to its WIP limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityStatus {
    /// No limit, or fewer cards than the limit
    Under,
    /// Exactly at the limit
    AtLimit,
    /// More cards than the limit allows
    Exceeded,
}

impl CapacityStatus {
    /// Evaluate a card count against an optional limit
    pub fn evaluate(limit: Option<usize>, count: usize) -> Self {
        match limit {
            Some(limit) if count > limit => Self::Exceeded,
            Some(limit) if count == limit => Self::AtLimit,
            _ => Self::Under,
        }
    }

    /// Whether the UI should flag the lane
    pub fn is_flagged(self) -> bool {
        !matches!(self, Self::Under)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_creation() {
        let lane = Lane::new("active", "Active", 1).with_capacity(2);
        assert_eq!(lane.id.as_str(), "active");
        assert_eq!(lane.ordinal, Ordinal::from(1));
        assert_eq!(lane.capacity, Some(2));
        assert_eq!(lane.version, Version::new(0));
    }

    #[test]
    fn test_capacity_status() {
        let lane = Lane::new("active", "Active", 0).with_capacity(2);
        assert_eq!(lane.capacity_status(1), CapacityStatus::Under);
        assert_eq!(lane.capacity_status(2), CapacityStatus::AtLimit);
        assert_eq!(lane.capacity_status(3), CapacityStatus::Exceeded);
        assert!(lane.capacity_status(3).is_flagged());
    }

    #[test]
    fn test_unlimited_lane_is_never_flagged() {
        let lane = Lane::new("backlog", "Backlog", 0);
        assert_eq!(lane.capacity_status(500), CapacityStatus::Under);
    }

    #[test]
    fn test_lane_deserializes_without_optional_fields() {
        let lane: Lane =
            serde_json::from_str(r#"{"id":"todo","name":"To Do","ordinal":0.0}"#).unwrap();
        assert!(lane.capacity.is_none());
        assert_eq!(lane.version, Version::default());
    }
}

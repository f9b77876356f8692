//! Card types: Card, its payload and priority

use super::ids::{CardId, LaneId};
use super::ordinal::{Ordinal, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Priority of a card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Domain attributes of a card.
///
/// The engine never looks inside except for `archived`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default)]
    pub archived: bool,
    /// Anything else the host application stores on a card
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl CardPayload {
    /// Create a payload with just a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the due timestamp
    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    /// Set the assignee
    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }
}

/// A card (task) on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub lane: LaneId,
    pub ordinal: Ordinal,
    pub payload: CardPayload,
    #[serde(default)]
    pub version: Version,
}

impl Card {
    /// Create a card at version 0
    pub fn new(
        id: impl Into<CardId>,
        lane: impl Into<LaneId>,
        ordinal: impl Into<Ordinal>,
        payload: CardPayload,
    ) -> Self {
        Self {
            id: id.into(),
            lane: lane.into(),
            ordinal: ordinal.into(),
            payload,
            version: Version::default(),
        }
    }

    /// Set the version stamp
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Version::new(version);
        self
    }

    /// The card's title
    pub fn title(&self) -> &str {
        &self.payload.title
    }
}

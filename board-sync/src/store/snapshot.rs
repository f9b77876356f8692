//! Read-only board snapshots handed to the rendering layer

use super::change::Preview;
use crate::types::{CapacityStatus, Card, CardId, Lane, LaneId};
use serde::{Deserialize, Serialize};

/// One lane as it should be drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneView {
    pub lane: Lane,
    /// Cards in display order, including a drag preview if one targets this lane
    pub cards: Vec<Card>,
    pub capacity: CapacityStatus,
}

impl LaneView {
    /// Ids of the displayed cards, in order
    pub fn card_ids(&self) -> Vec<&CardId> {
        self.cards.iter().map(|c| &c.id).collect()
    }
}

/// Immutable, self-consistent view of the whole board
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Lanes ordered left to right
    pub lanes: Vec<LaneView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<Preview>,
}

impl BoardSnapshot {
    /// Find a lane view by id
    pub fn lane(&self, id: &LaneId) -> Option<&LaneView> {
        self.lanes.iter().find(|v| &v.lane.id == id)
    }

    /// Find a displayed card by id
    pub fn card(&self, id: &CardId) -> Option<&Card> {
        self.lanes
            .iter()
            .flat_map(|v| v.cards.iter())
            .find(|c| &c.id == id)
    }

    /// Displayed card ids of a lane as plain strings, empty for unknown lanes
    pub fn lane_order(&self, id: &LaneId) -> Vec<String> {
        self.lane(id)
            .map(|v| v.cards.iter().map(|c| c.id.to_string()).collect())
            .unwrap_or_default()
    }

    /// Total number of displayed cards
    pub fn card_count(&self) -> usize {
        self.lanes.iter().map(|v| v.cards.len()).sum()
    }
}

//! Described changes accepted by [`super::BoardStore::apply`]

use crate::types::{Card, CardId, Lane, LaneId, Ordinal};
use serde::{Deserialize, Serialize};

/// Non-committed placement of the card being dragged.
///
/// The committed card is untouched; renderers see it at `index` of `lane`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub card: CardId,
    pub lane: LaneId,
    /// Index within the lane's rendered cards, the dragged card excluded
    pub index: usize,
    /// Allocated ordinal for display; absent when the lane needs a renumber
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisional_ordinal: Option<Ordinal>,
}

/// A change to the board, applied atomically
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    InsertLane(Lane),
    /// Replace a lane's name, ordinal, capacity, color and version
    UpdateLane(Lane),
    RemoveLane(LaneId),
    /// Reassign ordinals of several lanes at once
    RenumberLanes(Vec<(LaneId, Ordinal)>),
    InsertCard(Card),
    /// Replace a card wholesale (lane, ordinal, payload and version)
    ReplaceCard(Card),
    RemoveCard(CardId),
    /// Reassign ordinals of cards within one lane
    RenumberCards {
        lane: LaneId,
        ordinals: Vec<(CardId, Ordinal)>,
    },
    SetPreview(Preview),
    ClearPreview,
    /// Apply all changes or none
    Batch(Vec<Change>),
}

impl Change {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsertLane(_) => "insert lane",
            Self::UpdateLane(_) => "update lane",
            Self::RemoveLane(_) => "remove lane",
            Self::RenumberLanes(_) => "renumber lanes",
            Self::InsertCard(_) => "insert card",
            Self::ReplaceCard(_) => "replace card",
            Self::RemoveCard(_) => "remove card",
            Self::RenumberCards { .. } => "renumber cards",
            Self::SetPreview(_) => "set preview",
            Self::ClearPreview => "clear preview",
            Self::Batch(_) => "batch",
        }
    }
}

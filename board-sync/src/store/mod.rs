//! BoardStore - normalized in-memory board state
//!
//! The store is the single source of truth renderers draw from. It knows
//! nothing about storage or versions' meaning; the mutation pipeline and the
//! reconciliation listener decide *what* changes, the store guarantees each
//! change lands atomically and never breaks the board invariants:
//!
//! - every card's lane exists
//! - lane ordinals are unique
//! - ordinals are finite
//! - per-lane card order is always sorted by `(ordinal, id)`

mod change;
mod snapshot;

pub use change::{Change, Preview};
pub use snapshot::{BoardSnapshot, LaneView};

use crate::error::{BoardError, Result};
use crate::types::{CapacityStatus, Card, CardId, Lane, LaneId, Ordinal};
use std::collections::{HashMap, HashSet};

/// In-memory board state keyed by lane and card id
#[derive(Debug, Clone, Default)]
pub struct BoardStore {
    lanes: HashMap<LaneId, Lane>,
    cards: HashMap<CardId, Card>,
    /// Derived: card ids of each lane sorted by (ordinal, id)
    order: HashMap<LaneId, Vec<CardId>>,
    preview: Option<Preview>,
}

impl BoardStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from an initial fetch of lanes and cards
    pub fn load(lanes: Vec<Lane>, cards: Vec<Card>) -> Result<Self> {
        let mut store = Self::new();
        let changes = lanes
            .into_iter()
            .map(Change::InsertLane)
            .chain(cards.into_iter().map(Change::InsertCard))
            .collect();
        store.apply(Change::Batch(changes))?;
        tracing::debug!(
            lanes = store.lanes.len(),
            cards = store.cards.len(),
            "loaded board store"
        );
        Ok(store)
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Look up a lane
    pub fn lane(&self, id: &LaneId) -> Option<&Lane> {
        self.lanes.get(id)
    }

    /// Look up a committed card
    pub fn card(&self, id: &CardId) -> Option<&Card> {
        self.cards.get(id)
    }

    /// Whether a card is present
    pub fn contains_card(&self, id: &CardId) -> bool {
        self.cards.contains_key(id)
    }

    /// All lanes, left to right
    pub fn lanes(&self) -> Vec<&Lane> {
        let mut lanes: Vec<&Lane> = self.lanes.values().collect();
        lanes.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.id.cmp(&b.id)));
        lanes
    }

    /// Committed cards of a lane sorted by ordinal, ignoring any drag preview
    pub fn lane_cards(&self, id: &LaneId) -> Vec<Card> {
        self.order
            .get(id)
            .map(|ids| ids.iter().filter_map(|c| self.cards.get(c)).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of committed cards in a lane
    pub fn card_count(&self, id: &LaneId) -> usize {
        self.order.get(id).map_or(0, Vec::len)
    }

    /// Cards of a lane as they should be drawn.
    ///
    /// The dragged card is pulled out of its committed lane and shown at the
    /// preview index of the preview lane.
    pub fn rendered_lane(&self, id: &LaneId) -> Vec<Card> {
        let dragged = self.preview.as_ref().map(|p| &p.card);
        let mut cards: Vec<Card> = self
            .lane_cards(id)
            .into_iter()
            .filter(|c| Some(&c.id) != dragged)
            .collect();

        if let Some(preview) = self.preview.as_ref().filter(|p| &p.lane == id) {
            if let Some(card) = self.cards.get(&preview.card) {
                let mut shown = card.clone();
                shown.lane = preview.lane.clone();
                if let Some(ordinal) = preview.provisional_ordinal {
                    shown.ordinal = ordinal;
                }
                let index = preview.index.min(cards.len());
                cards.insert(index, shown);
            }
        }
        cards
    }

    /// The active drag preview, if any
    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    /// Capacity status of a lane's committed contents
    pub fn capacity(&self, id: &LaneId) -> Option<CapacityStatus> {
        self.lanes
            .get(id)
            .map(|lane| lane.capacity_status(self.card_count(id)))
    }

    /// Build an immutable snapshot of what the UI should render
    pub fn snapshot(&self) -> BoardSnapshot {
        let lanes = self
            .lanes()
            .into_iter()
            .map(|lane| {
                let cards = self.rendered_lane(&lane.id);
                LaneView {
                    capacity: lane.capacity_status(cards.len()),
                    lane: lane.clone(),
                    cards,
                }
            })
            .collect();
        BoardSnapshot {
            lanes,
            preview: self.preview.clone(),
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Apply a change atomically.
    ///
    /// On error nothing is modified. Errors here are invariant violations
    /// and mean the caller handed the store inconsistent data.
    pub fn apply(&mut self, change: Change) -> Result<()> {
        let kind = change.kind();
        let result = match change {
            Change::Batch(changes) => {
                let mut scratch = self.clone();
                changes
                    .into_iter()
                    .try_for_each(|change| scratch.apply_one(change))
                    .map(|()| *self = scratch)
            }
            other => self.apply_one(other),
        };
        if let Err(ref e) = result {
            tracing::warn!(change = kind, error = %e, "store refused change");
        }
        result
    }

    fn apply_one(&mut self, change: Change) -> Result<()> {
        match change {
            Change::InsertLane(lane) => {
                if self.lanes.contains_key(&lane.id) {
                    return Err(BoardError::duplicate_id("lane", lane.id.as_str()));
                }
                self.check_lane_ordinal(&lane.id, lane.ordinal)?;
                self.order.entry(lane.id.clone()).or_default();
                self.lanes.insert(lane.id.clone(), lane);
            }
            Change::UpdateLane(lane) => {
                if !self.lanes.contains_key(&lane.id) {
                    return Err(BoardError::lane_not_found(&lane.id));
                }
                self.check_lane_ordinal(&lane.id, lane.ordinal)?;
                self.lanes.insert(lane.id.clone(), lane);
            }
            Change::RemoveLane(id) => {
                if !self.lanes.contains_key(&id) {
                    return Err(BoardError::lane_not_found(&id));
                }
                let count = self.card_count(&id);
                if count > 0 {
                    return Err(BoardError::LaneNotEmpty {
                        id: id.to_string(),
                        count,
                    });
                }
                if self.preview.as_ref().is_some_and(|p| p.lane == id) {
                    self.preview = None;
                }
                self.lanes.remove(&id);
                self.order.remove(&id);
            }
            Change::RenumberLanes(entries) => {
                let mut next: HashMap<LaneId, Ordinal> = self
                    .lanes
                    .values()
                    .map(|l| (l.id.clone(), l.ordinal))
                    .collect();
                for (id, ordinal) in &entries {
                    check_finite(*ordinal, id.as_str())?;
                    match next.get_mut(id) {
                        Some(slot) => *slot = *ordinal,
                        None => return Err(BoardError::lane_not_found(id)),
                    }
                }
                let mut seen = HashSet::new();
                for ordinal in next.values() {
                    if !seen.insert(ordinal.value().to_bits()) {
                        return Err(BoardError::invariant(format!(
                            "lane renumber leaves two lanes at ordinal {}",
                            ordinal
                        )));
                    }
                }
                for (id, ordinal) in next {
                    if let Some(lane) = self.lanes.get_mut(&id) {
                        lane.ordinal = ordinal;
                    }
                }
            }
            Change::InsertCard(card) => {
                if self.cards.contains_key(&card.id) {
                    return Err(BoardError::duplicate_id("card", card.id.as_str()));
                }
                self.check_card(&card)?;
                let lane = card.lane.clone();
                self.cards.insert(card.id.clone(), card);
                self.reindex(&lane);
            }
            Change::ReplaceCard(card) => {
                let previous_lane = match self.cards.get(&card.id) {
                    Some(existing) => existing.lane.clone(),
                    None => return Err(BoardError::card_not_found(&card.id)),
                };
                self.check_card(&card)?;
                let lane = card.lane.clone();
                self.cards.insert(card.id.clone(), card);
                self.reindex(&previous_lane);
                if lane != previous_lane {
                    self.reindex(&lane);
                }
            }
            Change::RemoveCard(id) => {
                let removed = self
                    .cards
                    .remove(&id)
                    .ok_or_else(|| BoardError::card_not_found(&id))?;
                if self.preview.as_ref().is_some_and(|p| p.card == id) {
                    self.preview = None;
                }
                self.reindex(&removed.lane);
            }
            Change::RenumberCards { lane, ordinals } => {
                if !self.lanes.contains_key(&lane) {
                    return Err(BoardError::lane_not_found(&lane));
                }
                for (id, ordinal) in &ordinals {
                    check_finite(*ordinal, id.as_str())?;
                    let card = self
                        .cards
                        .get(id)
                        .ok_or_else(|| BoardError::card_not_found(id))?;
                    if card.lane != lane {
                        return Err(BoardError::invariant(format!(
                            "renumber of lane {} lists card {} from lane {}",
                            lane, id, card.lane
                        )));
                    }
                }
                for (id, ordinal) in ordinals {
                    if let Some(card) = self.cards.get_mut(&id) {
                        card.ordinal = ordinal;
                    }
                }
                self.reindex(&lane);
            }
            Change::SetPreview(preview) => {
                if !self.cards.contains_key(&preview.card) {
                    return Err(BoardError::card_not_found(&preview.card));
                }
                if !self.lanes.contains_key(&preview.lane) {
                    return Err(BoardError::lane_not_found(&preview.lane));
                }
                self.preview = Some(preview);
            }
            Change::ClearPreview => {
                self.preview = None;
            }
            Change::Batch(changes) => {
                for change in changes {
                    self.apply_one(change)?;
                }
            }
        }
        Ok(())
    }

    fn check_lane_ordinal(&self, id: &LaneId, ordinal: Ordinal) -> Result<()> {
        check_finite(ordinal, id.as_str())?;
        if let Some(other) = self
            .lanes
            .values()
            .find(|l| &l.id != id && l.ordinal == ordinal)
        {
            return Err(BoardError::invariant(format!(
                "lane {} would share ordinal {} with lane {}",
                id, ordinal, other.id
            )));
        }
        Ok(())
    }

    fn check_card(&self, card: &Card) -> Result<()> {
        if !self.lanes.contains_key(&card.lane) {
            return Err(BoardError::invariant(format!(
                "card {} references missing lane {}",
                card.id, card.lane
            )));
        }
        check_finite(card.ordinal, card.id.as_str())
    }

    fn reindex(&mut self, lane: &LaneId) {
        if !self.lanes.contains_key(lane) {
            self.order.remove(lane);
            return;
        }
        let mut ids: Vec<(&Ordinal, &CardId)> = self
            .cards
            .values()
            .filter(|c| &c.lane == lane)
            .map(|c| (&c.ordinal, &c.id))
            .collect();
        ids.sort();
        let ids = ids.into_iter().map(|(_, id)| id.clone()).collect();
        self.order.insert(lane.clone(), ids);
    }
}

fn check_finite(ordinal: Ordinal, owner: &str) -> Result<()> {
    if ordinal.is_finite() {
        Ok(())
    } else {
        Err(BoardError::invariant(format!(
            "{} has non-finite ordinal {}",
            owner, ordinal
        )))
    }
}

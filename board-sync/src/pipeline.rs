//! Optimistic mutation pipeline.
//!
//! A mutation is split in two halves so the awaited durable write never holds
//! the store:
//!
//! 1. `begin_*` snapshots the card, applies the change to the store right
//!    away (version + 1, card unconfirmed) and returns the [`WriteRequest`]
//!    to send.
//! 2. [`MutationPipeline::settle`] takes storage's answer and either confirms
//!    the card at the returned version or restores the snapshot.
//!
//! Different cards may be in flight at once; a second mutation on a card
//! that is still unconfirmed is refused with [`BoardError::CardBusy`].

use crate::allocator;
use crate::error::{BoardError, Result};
use crate::storage::{PersistFailure, RenumberRequest, WriteRequest};
use crate::store::{BoardStore, Change};
use crate::types::{CapacityStatus, Card, CardId, CardPayload, LaneId, Ordinal, Version};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// What a mutation does to its card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Move,
    Edit,
    Archive,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Move => "move",
            Self::Edit => "edit",
            Self::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// Requests to send to storage for a mutation that has been applied locally
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedWrite {
    pub kind: MutationKind,
    pub request: WriteRequest,
    /// Present when the destination lane had to be renumbered first
    pub renumber: Option<RenumberRequest>,
}

/// Final result of a mutation once storage has answered
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Storage accepted the write
    Confirmed {
        card: CardId,
        kind: MutationKind,
        version: Version,
        /// Capacity of the card's lane after the commit; `None` for archival
        capacity: Option<CapacityStatus>,
    },
    /// Storage refused or never answered; local state was restored
    RolledBack {
        card: CardId,
        kind: MutationKind,
        failure: PersistFailure,
    },
}

impl CommitOutcome {
    /// The card this outcome is about
    pub fn card(&self) -> &CardId {
        match self {
            Self::Confirmed { card, .. } | Self::RolledBack { card, .. } => card,
        }
    }

    /// Whether storage accepted the write
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    /// The rollback reason, if any
    pub fn failure(&self) -> Option<&PersistFailure> {
        match self {
            Self::RolledBack { failure, .. } => Some(failure),
            Self::Confirmed { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingMutation {
    kind: MutationKind,
    /// Card exactly as it was before the mutation
    before: Card,
    /// Ordinals of the destination lane before a renumber, for rollback
    lane_before: Option<(LaneId, Vec<(CardId, Ordinal)>)>,
}

/// Tracks unconfirmed local mutations
#[derive(Debug, Default)]
pub struct MutationPipeline {
    in_flight: HashMap<CardId, PendingMutation>,
}

impl MutationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the card has a mutation awaiting storage
    pub fn is_unconfirmed(&self, card: &CardId) -> bool {
        self.in_flight.contains_key(card)
    }

    /// Cards with a mutation awaiting storage
    pub fn unconfirmed_cards(&self) -> impl Iterator<Item = &CardId> {
        self.in_flight.keys()
    }

    /// Move a card to `index` of `lane` (the card itself not counted)
    pub fn begin_move(
        &mut self,
        store: &mut BoardStore,
        card: &CardId,
        lane: &LaneId,
        index: usize,
        ordinal_step: f64,
    ) -> Result<PreparedWrite> {
        let before = self.claim(store, card)?;
        if store.lane(lane).is_none() {
            return Err(BoardError::lane_not_found(lane));
        }

        let others: Vec<Card> = store
            .lane_cards(lane)
            .into_iter()
            .filter(|c| &c.id != card)
            .collect();

        let mut changes = Vec::new();
        let mut lane_before = None;
        let mut renumber = None;
        let ordinal = match allocator::allocate(&others, index, ordinal_step) {
            Ok(ordinal) => ordinal,
            Err(exhausted) => {
                tracing::info!(
                    lane = %lane,
                    index = exhausted.index,
                    "ordinal gap exhausted, renumbering lane"
                );
                let ordinals = allocator::renumber(&others);
                let renumbered: Vec<Card> = others
                    .iter()
                    .zip(&ordinals)
                    .map(|(c, (_, ordinal))| Card {
                        ordinal: *ordinal,
                        ..c.clone()
                    })
                    .collect();
                let ordinal =
                    allocator::allocate(&renumbered, index, ordinal_step).map_err(|e| {
                        BoardError::invariant(format!(
                            "lane {} still exhausted after renumber: {}",
                            lane, e
                        ))
                    })?;

                lane_before = Some((
                    lane.clone(),
                    others.iter().map(|c| (c.id.clone(), c.ordinal)).collect(),
                ));
                renumber = Some(RenumberRequest {
                    lane_id: lane.clone(),
                    ordered_card_ids: others.iter().map(|c| c.id.clone()).collect(),
                });
                changes.push(Change::RenumberCards {
                    lane: lane.clone(),
                    ordinals,
                });
                ordinal
            }
        };

        let after = Card {
            lane: lane.clone(),
            ordinal,
            version: before.version.next(),
            ..before.clone()
        };
        changes.push(Change::ReplaceCard(after));
        store.apply(Change::Batch(changes))?;

        let request = WriteRequest {
            card_id: card.clone(),
            new_lane_id: lane.clone(),
            new_ordinal: ordinal,
            expected_prior_version: before.version,
            payload: None,
        };
        tracing::debug!(
            card = %card,
            lane = %lane,
            ordinal = %ordinal,
            "move applied optimistically"
        );
        Ok(self.track(MutationKind::Move, before, lane_before, request, renumber))
    }

    /// Replace a card's attributes without moving it
    pub fn begin_edit(
        &mut self,
        store: &mut BoardStore,
        card: &CardId,
        payload: CardPayload,
    ) -> Result<PreparedWrite> {
        let before = self.claim(store, card)?;
        let after = Card {
            payload: payload.clone(),
            version: before.version.next(),
            ..before.clone()
        };
        store.apply(Change::ReplaceCard(after))?;

        let request = WriteRequest {
            card_id: card.clone(),
            new_lane_id: before.lane.clone(),
            new_ordinal: before.ordinal,
            expected_prior_version: before.version,
            payload: Some(payload),
        };
        tracing::debug!(card = %card, "edit applied optimistically");
        Ok(self.track(MutationKind::Edit, before, None, request, None))
    }

    /// Archive a card: it leaves the board immediately
    pub fn begin_archive(
        &mut self,
        store: &mut BoardStore,
        card: &CardId,
    ) -> Result<PreparedWrite> {
        let before = self.claim(store, card)?;
        store.apply(Change::RemoveCard(card.clone()))?;

        let request = WriteRequest {
            card_id: card.clone(),
            new_lane_id: before.lane.clone(),
            new_ordinal: before.ordinal,
            expected_prior_version: before.version,
            payload: Some(CardPayload {
                archived: true,
                ..before.payload.clone()
            }),
        };
        tracing::debug!(card = %card, "archive applied optimistically");
        Ok(self.track(MutationKind::Archive, before, None, request, None))
    }

    /// Finalize the card's in-flight mutation with storage's answer
    pub fn settle(
        &mut self,
        store: &mut BoardStore,
        card: &CardId,
        result: std::result::Result<Version, PersistFailure>,
    ) -> Result<CommitOutcome> {
        let pending = self.in_flight.remove(card).ok_or_else(|| {
            BoardError::invariant(format!("settle for card {} with no mutation in flight", card))
        })?;

        match result {
            Ok(version) => {
                let mut capacity = None;
                if let Some(current) = store.card(card) {
                    let lane = current.lane.clone();
                    let confirmed = Card {
                        version,
                        ..current.clone()
                    };
                    store.apply(Change::ReplaceCard(confirmed))?;
                    capacity = store.capacity(&lane);
                }
                tracing::info!(
                    card = %card,
                    kind = %pending.kind,
                    version = %version,
                    "mutation confirmed"
                );
                Ok(CommitOutcome::Confirmed {
                    card: card.clone(),
                    kind: pending.kind,
                    version,
                    capacity,
                })
            }
            Err(failure) => {
                tracing::warn!(
                    card = %card,
                    kind = %pending.kind,
                    %failure,
                    "mutation rolled back"
                );
                let changes = rollback(store, card, &pending, &failure);
                if let Err(e) = store.apply(Change::Batch(changes)) {
                    // the local copy can no longer be trusted; drop it
                    tracing::warn!(card = %card, error = %e, "rollback refused, removing card");
                    if store.contains_card(card) {
                        store.apply(Change::RemoveCard(card.clone()))?;
                    }
                }
                Ok(CommitOutcome::RolledBack {
                    card: card.clone(),
                    kind: pending.kind,
                    failure,
                })
            }
        }
    }

    fn claim(&self, store: &BoardStore, card: &CardId) -> Result<Card> {
        if self.is_unconfirmed(card) {
            return Err(BoardError::CardBusy {
                id: card.to_string(),
            });
        }
        store
            .card(card)
            .cloned()
            .ok_or_else(|| BoardError::card_not_found(card))
    }

    fn track(
        &mut self,
        kind: MutationKind,
        before: Card,
        lane_before: Option<(LaneId, Vec<(CardId, Ordinal)>)>,
        request: WriteRequest,
        renumber: Option<RenumberRequest>,
    ) -> PreparedWrite {
        self.in_flight.insert(
            before.id.clone(),
            PendingMutation {
                kind,
                before,
                lane_before,
            },
        );
        PreparedWrite {
            kind,
            request,
            renumber,
        }
    }
}

/// Changes that undo a pending mutation against the store as it is now
fn rollback(
    store: &BoardStore,
    card: &CardId,
    pending: &PendingMutation,
    failure: &PersistFailure,
) -> Vec<Change> {
    let mut changes = Vec::new();

    if let Some((lane, ordinals)) = &pending.lane_before {
        // cards may have left the lane since; restore only those still there
        let ordinals: Vec<(CardId, Ordinal)> = ordinals
            .iter()
            .filter(|(id, _)| store.card(id).is_some_and(|c| &c.lane == lane))
            .cloned()
            .collect();
        if store.lane(lane).is_some() && !ordinals.is_empty() {
            changes.push(Change::RenumberCards {
                lane: lane.clone(),
                ordinals,
            });
        }
    }

    let present = store.contains_card(card);
    // a card whose origin lane was deleted meanwhile has nowhere to go back to
    let restorable = !matches!(failure, PersistFailure::NotFound)
        && store.lane(&pending.before.lane).is_some();
    match (restorable, present) {
        (false, true) => changes.push(Change::RemoveCard(card.clone())),
        (false, false) => {}
        (true, true) => changes.push(Change::ReplaceCard(pending.before.clone())),
        (true, false) => changes.push(Change::InsertCard(pending.before.clone())),
    }
    changes
}

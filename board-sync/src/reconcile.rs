//! Reconciliation of remote change notifications.
//!
//! Remote events arrive at-least-once and in any order. Each carries the
//! version storage assigned, and an event only lands when its version is
//! strictly newer than the local copy. Events for a card with a local
//! mutation in flight are held back and replayed, oldest first, once that
//! mutation settles; renumber batches touching such a card are deferred as a
//! whole.
//!
//! Deletes leave a tombstone at their version, so a late or redelivered
//! insert for a deleted card or lane is dropped instead of bringing it back.

use crate::error::{BoardError, Result};
use crate::store::{BoardStore, Change};
use crate::types::{Card, CardId, Lane, LaneId, Ordinal, Version};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Insert,
    Update,
    Delete,
}

/// New ordinal of one card in a renumber batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardOrdinal {
    pub card: CardId,
    pub ordinal: Ordinal,
    pub version: Version,
}

/// New ordinal of one lane in a renumber batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneOrdinal {
    pub lane: LaneId,
    pub ordinal: Ordinal,
    pub version: Version,
}

/// A change notification from the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteEvent {
    Card {
        id: CardId,
        kind: EventKind,
        version: Version,
        /// Full record for inserts and updates
        #[serde(default, skip_serializing_if = "Option::is_none")]
        card: Option<Card>,
    },
    Lane {
        id: LaneId,
        kind: EventKind,
        version: Version,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lane: Option<Lane>,
    },
    /// Ordinals of several cards of one lane, applied all at once
    CardRenumber {
        lane: LaneId,
        entries: Vec<CardOrdinal>,
    },
    LaneRenumber {
        entries: Vec<LaneOrdinal>,
    },
}

impl RemoteEvent {
    /// Version carried by single-entity events; batches report their newest entry
    pub fn version(&self) -> Version {
        match self {
            Self::Card { version, .. } | Self::Lane { version, .. } => *version,
            Self::CardRenumber { entries, .. } => entries
                .iter()
                .map(|e| e.version)
                .max()
                .unwrap_or_default(),
            Self::LaneRenumber { entries } => entries
                .iter()
                .map(|e| e.version)
                .max()
                .unwrap_or_default(),
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Card { .. } => "card",
            Self::Lane { .. } => "lane",
            Self::CardRenumber { .. } => "card renumber",
            Self::LaneRenumber { .. } => "lane renumber",
        }
    }
}

/// Why an event was not applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    /// Duplicate or out-of-order delivery
    Stale { local: Version, remote: Version },
    /// Delete or archive of something the board does not hold
    UnknownEntity,
    /// Update without the record it updates to
    MissingBody,
    /// Older than a delete already waiting for the same card
    Superseded,
    /// Renumber batch in which no entry is newer than the local copy
    NoNewerEntries,
    /// Would have broken a board invariant
    Invalid { message: String },
}

/// Result of handing one event to the listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied,
    /// Held until the card's local mutation settles
    Buffered,
    /// Renumber batch held until every listed card is confirmed
    Deferred,
    Dropped(DropReason),
}

/// Folds remote events into the store
#[derive(Debug, Default)]
pub struct Reconciler {
    buffered: HashMap<CardId, Vec<RemoteEvent>>,
    deferred: Vec<RemoteEvent>,
    /// Highest delete version seen per card; older writes never resurrect it
    deleted_cards: HashMap<CardId, Version>,
    deleted_lanes: HashMap<LaneId, Version>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events waiting on the card
    pub fn buffered_for(&self, card: &CardId) -> usize {
        self.buffered.get(card).map_or(0, Vec::len)
    }

    /// Number of deferred renumber batches
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Version of the last delete seen for `card`, if any
    pub fn tombstone(&self, card: &CardId) -> Option<Version> {
        self.deleted_cards.get(card).copied()
    }

    /// Note that `card` left the board at `version` outside the event
    /// stream, e.g. a confirmed local archive.
    pub fn record_removal(&mut self, card: &CardId, version: Version) {
        tomb(&mut self.deleted_cards, card.clone(), version);
    }

    /// Handle one remote event.
    ///
    /// `is_unconfirmed` reports whether a card has a local mutation in
    /// flight. An `Err` is fatal for this event only: the store is untouched.
    pub fn receive<F>(
        &mut self,
        store: &mut BoardStore,
        is_unconfirmed: F,
        event: RemoteEvent,
    ) -> Result<ReconcileOutcome>
    where
        F: Fn(&CardId) -> bool,
    {
        tracing::debug!(event = event.kind(), version = %event.version(), "remote event");
        match &event {
            RemoteEvent::Card { id, .. } if is_unconfirmed(id) => {
                let id = id.clone();
                return Ok(self.buffer(id, event));
            }
            RemoteEvent::CardRenumber { entries, .. }
                if entries.iter().any(|e| is_unconfirmed(&e.card)) =>
            {
                tracing::debug!("deferring card renumber over unconfirmed card");
                self.deferred.push(event);
                return Ok(ReconcileOutcome::Deferred);
            }
            _ => {}
        }

        let outcome = match event {
            RemoteEvent::Card {
                id,
                kind,
                version,
                card,
            } => self.apply_card_event(store, id, kind, version, card)?,
            RemoteEvent::Lane {
                id,
                kind,
                version,
                lane,
            } => self.apply_lane_event(store, id, kind, version, lane)?,
            RemoteEvent::CardRenumber { lane, entries } => {
                apply_card_renumber(store, lane, entries)?
            }
            RemoteEvent::LaneRenumber { entries } => apply_lane_renumber(store, entries)?,
        };
        Ok(outcome)
    }

    /// Replay events held for `card` after its mutation settled, then retry
    /// deferred renumber batches.
    ///
    /// Events failing an invariant are dropped as [`DropReason::Invalid`].
    pub fn replay<F>(
        &mut self,
        store: &mut BoardStore,
        is_unconfirmed: F,
        card: &CardId,
    ) -> Vec<ReconcileOutcome>
    where
        F: Fn(&CardId) -> bool,
    {
        let mut events = self.buffered.remove(card).unwrap_or_default();
        events.sort_by_key(RemoteEvent::version);
        if !events.is_empty() {
            tracing::debug!(card = %card, count = events.len(), "replaying buffered events");
        }

        let mut outcomes: Vec<ReconcileOutcome> = events
            .into_iter()
            .map(|event| self.receive_or_drop(store, &is_unconfirmed, event))
            .collect();
        outcomes.extend(self.retry_deferred(store, &is_unconfirmed));
        outcomes
    }

    /// Retry deferred renumber batches, keeping arrival order
    pub fn retry_deferred<F>(
        &mut self,
        store: &mut BoardStore,
        is_unconfirmed: F,
    ) -> Vec<ReconcileOutcome>
    where
        F: Fn(&CardId) -> bool,
    {
        std::mem::take(&mut self.deferred)
            .into_iter()
            .map(|event| self.receive_or_drop(store, &is_unconfirmed, event))
            .collect()
    }

    fn receive_or_drop<F>(
        &mut self,
        store: &mut BoardStore,
        is_unconfirmed: F,
        event: RemoteEvent,
    ) -> ReconcileOutcome
    where
        F: Fn(&CardId) -> bool,
    {
        let kind = event.kind();
        self.receive(store, is_unconfirmed, event)
            .unwrap_or_else(|e| {
                tracing::warn!(event = kind, error = %e, "dropping remote event");
                ReconcileOutcome::Dropped(DropReason::Invalid {
                    message: e.to_string(),
                })
            })
    }

    fn buffer(&mut self, card: CardId, event: RemoteEvent) -> ReconcileOutcome {
        let version = event.version();
        let is_delete = matches!(
            event,
            RemoteEvent::Card {
                kind: EventKind::Delete,
                ..
            }
        );
        let held = self.buffered.entry(card).or_default();

        if is_delete {
            held.clear();
        } else if held.iter().any(|e| {
            matches!(e, RemoteEvent::Card { kind: EventKind::Delete, .. }) && e.version() >= version
        }) {
            return ReconcileOutcome::Dropped(DropReason::Superseded);
        }
        held.push(event);
        ReconcileOutcome::Buffered
    }

    fn apply_card_event(
        &mut self,
        store: &mut BoardStore,
        id: CardId,
        kind: EventKind,
        version: Version,
        card: Option<Card>,
    ) -> Result<ReconcileOutcome> {
        if kind == EventKind::Delete {
            let present = store.contains_card(&id);
            if present {
                store.apply(Change::RemoveCard(id.clone()))?;
            }
            // an absent card may still arrive later with an older insert
            tomb(&mut self.deleted_cards, id, version);
            return Ok(if present {
                ReconcileOutcome::Applied
            } else {
                ReconcileOutcome::Dropped(DropReason::UnknownEntity)
            });
        }

        if let Some(deleted) = self.deleted_cards.get(&id).copied() {
            if version <= deleted {
                tracing::debug!(card = %id, %version, %deleted, "event predates delete");
                return Ok(ReconcileOutcome::Dropped(DropReason::Stale {
                    local: deleted,
                    remote: version,
                }));
            }
        }

        let Some(mut card) = card else {
            return Ok(ReconcileOutcome::Dropped(DropReason::MissingBody));
        };
        if card.id != id {
            return Err(BoardError::invariant(format!(
                "event for card {} carries card {}",
                id, card.id
            )));
        }
        card.version = version;

        let archived = card.payload.archived;
        let change = match store.card(&id) {
            Some(local) if version <= local.version => {
                return Ok(ReconcileOutcome::Dropped(DropReason::Stale {
                    local: local.version,
                    remote: version,
                }));
            }
            Some(_) if archived => Change::RemoveCard(id.clone()),
            Some(_) => Change::ReplaceCard(card),
            None if archived => {
                tomb(&mut self.deleted_cards, id, version);
                return Ok(ReconcileOutcome::Dropped(DropReason::UnknownEntity));
            }
            None => Change::InsertCard(card),
        };
        store.apply(change)?;
        if archived {
            tomb(&mut self.deleted_cards, id, version);
        } else {
            self.deleted_cards.remove(&id);
        }
        Ok(ReconcileOutcome::Applied)
    }

    fn apply_lane_event(
        &mut self,
        store: &mut BoardStore,
        id: LaneId,
        kind: EventKind,
        version: Version,
        lane: Option<Lane>,
    ) -> Result<ReconcileOutcome> {
        if kind == EventKind::Delete {
            let present = store.lane(&id).is_some();
            if present {
                store.apply(Change::RemoveLane(id.clone()))?;
            }
            tomb(&mut self.deleted_lanes, id, version);
            return Ok(if present {
                ReconcileOutcome::Applied
            } else {
                ReconcileOutcome::Dropped(DropReason::UnknownEntity)
            });
        }

        if let Some(deleted) = self.deleted_lanes.get(&id).copied() {
            if version <= deleted {
                tracing::debug!(lane = %id, %version, %deleted, "event predates delete");
                return Ok(ReconcileOutcome::Dropped(DropReason::Stale {
                    local: deleted,
                    remote: version,
                }));
            }
        }

        let Some(mut lane) = lane else {
            return Ok(ReconcileOutcome::Dropped(DropReason::MissingBody));
        };
        if lane.id != id {
            return Err(BoardError::invariant(format!(
                "event for lane {} carries lane {}",
                id, lane.id
            )));
        }
        lane.version = version;

        let change = match store.lane(&id) {
            Some(local) if version <= local.version => {
                return Ok(ReconcileOutcome::Dropped(DropReason::Stale {
                    local: local.version,
                    remote: version,
                }));
            }
            Some(_) => Change::UpdateLane(lane),
            None => Change::InsertLane(lane),
        };
        store.apply(change)?;
        self.deleted_lanes.remove(&id);
        Ok(ReconcileOutcome::Applied)
    }
}

/// Keep the highest delete version per entity
fn tomb<K: std::hash::Hash + Eq>(tombs: &mut HashMap<K, Version>, key: K, version: Version) {
    let entry = tombs.entry(key).or_insert(version);
    *entry = (*entry).max(version);
}

fn apply_card_renumber(
    store: &mut BoardStore,
    lane: LaneId,
    entries: Vec<CardOrdinal>,
) -> Result<ReconcileOutcome> {
    if store.lane(&lane).is_none() {
        return Err(BoardError::lane_not_found(&lane));
    }
    let changes: Vec<Change> = entries
        .into_iter()
        .filter_map(|entry| {
            let local = store.card(&entry.card)?;
            (entry.version > local.version).then(|| {
                Change::ReplaceCard(Card {
                    lane: lane.clone(),
                    ordinal: entry.ordinal,
                    version: entry.version,
                    ..local.clone()
                })
            })
        })
        .collect();

    if changes.is_empty() {
        return Ok(ReconcileOutcome::Dropped(DropReason::NoNewerEntries));
    }
    tracing::info!(lane = %lane, cards = changes.len(), "applying remote card renumber");
    store.apply(Change::Batch(changes))?;
    Ok(ReconcileOutcome::Applied)
}

fn apply_lane_renumber(
    store: &mut BoardStore,
    entries: Vec<LaneOrdinal>,
) -> Result<ReconcileOutcome> {
    let newer: Vec<Lane> = entries
        .into_iter()
        .filter_map(|entry| {
            let local = store.lane(&entry.lane)?;
            (entry.version > local.version).then(|| Lane {
                ordinal: entry.ordinal,
                version: entry.version,
                ..local.clone()
            })
        })
        .collect();

    if newer.is_empty() {
        return Ok(ReconcileOutcome::Dropped(DropReason::NoNewerEntries));
    }
    tracing::info!(lanes = newer.len(), "applying remote lane renumber");
    // ordinals first so swaps never collide, then the version stamps
    let mut changes = vec![Change::RenumberLanes(
        newer.iter().map(|l| (l.id.clone(), l.ordinal)).collect(),
    )];
    changes.extend(newer.into_iter().map(Change::UpdateLane));
    store.apply(Change::Batch(changes))?;
    Ok(ReconcileOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CardPayload;

    fn store() -> BoardStore {
        BoardStore::load(
            vec![
                Lane::new("waiting", "Waiting", 0).with_version(1),
                Lane::new("done", "Done", 1).with_version(1),
            ],
            vec![
                Card::new("a", "waiting", 10, CardPayload::titled("A")).with_version(1),
                Card::new("b", "waiting", 20, CardPayload::titled("B")).with_version(1),
            ],
        )
        .unwrap()
    }

    fn update(id: &str, version: u64, title: &str) -> RemoteEvent {
        RemoteEvent::Card {
            id: id.into(),
            kind: EventKind::Update,
            version: Version::new(version),
            card: Some(Card::new(id, "waiting", 10, CardPayload::titled(title))),
        }
    }

    fn delete(id: &str, version: u64) -> RemoteEvent {
        RemoteEvent::Card {
            id: id.into(),
            kind: EventKind::Delete,
            version: Version::new(version),
            card: None,
        }
    }

    fn confirmed(_: &CardId) -> bool {
        false
    }

    #[test]
    fn test_versions_apply_monotonically() {
        let mut store = store();
        let mut reconciler = Reconciler::new();

        let outcomes: Vec<_> = [5, 3, 7, 7, 6]
            .into_iter()
            .map(|v| {
                reconciler
                    .receive(&mut store, confirmed, update("a", v, &format!("v{}", v)))
                    .unwrap()
            })
            .collect();

        assert_eq!(outcomes[0], ReconcileOutcome::Applied);
        assert!(matches!(outcomes[1], ReconcileOutcome::Dropped(DropReason::Stale { .. })));
        assert_eq!(outcomes[2], ReconcileOutcome::Applied);
        assert!(matches!(outcomes[3], ReconcileOutcome::Dropped(_)));
        assert!(matches!(outcomes[4], ReconcileOutcome::Dropped(_)));

        let card = store.card(&"a".into()).unwrap();
        assert_eq!(card.version, Version::new(7));
        assert_eq!(card.title(), "v7");
    }

    #[test]
    fn test_update_after_delete_is_stale() {
        let mut store = store();
        let mut reconciler = Reconciler::new();

        assert_eq!(
            reconciler.receive(&mut store, confirmed, delete("a", 6)).unwrap(),
            ReconcileOutcome::Applied
        );
        assert_eq!(
            reconciler.receive(&mut store, confirmed, update("a", 5, "late")).unwrap(),
            ReconcileOutcome::Dropped(DropReason::Stale {
                local: Version::new(6),
                remote: Version::new(5),
            })
        );
        assert!(!store.contains_card(&"a".into()));

        // a redelivered insert at the original version stays dead too
        let insert = RemoteEvent::Card {
            id: "a".into(),
            kind: EventKind::Insert,
            version: Version::new(1),
            card: Some(Card::new("a", "waiting", 10, CardPayload::titled("A"))),
        };
        assert!(matches!(
            reconciler.receive(&mut store, confirmed, insert).unwrap(),
            ReconcileOutcome::Dropped(DropReason::Stale { .. })
        ));
        assert!(!store.contains_card(&"a".into()));

        // a newer write recreates the card and clears the tombstone
        assert_eq!(
            reconciler.receive(&mut store, confirmed, update("a", 7, "back")).unwrap(),
            ReconcileOutcome::Applied
        );
        assert_eq!(store.card(&"a".into()).unwrap().title(), "back");
        assert_eq!(reconciler.tombstone(&"a".into()), None);
    }

    #[test]
    fn test_delete_arriving_before_insert_wins() {
        let mut store = store();
        let mut reconciler = Reconciler::new();

        assert_eq!(
            reconciler.receive(&mut store, confirmed, delete("c", 2)).unwrap(),
            ReconcileOutcome::Dropped(DropReason::UnknownEntity)
        );
        assert!(matches!(
            reconciler.receive(&mut store, confirmed, update("c", 1, "C")).unwrap(),
            ReconcileOutcome::Dropped(DropReason::Stale { .. })
        ));
        assert!(!store.contains_card(&"c".into()));
    }

    #[test]
    fn test_archive_leaves_a_tombstone() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let mut payload = CardPayload::titled("A");
        payload.archived = true;
        let archive = RemoteEvent::Card {
            id: "a".into(),
            kind: EventKind::Update,
            version: Version::new(4),
            card: Some(Card::new("a", "waiting", 10, payload)),
        };
        reconciler.receive(&mut store, confirmed, archive).unwrap();

        assert!(matches!(
            reconciler.receive(&mut store, confirmed, update("a", 3, "late")).unwrap(),
            ReconcileOutcome::Dropped(DropReason::Stale { .. })
        ));
        assert!(!store.contains_card(&"a".into()));
    }

    #[test]
    fn test_lane_update_after_delete_is_stale() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let delete = RemoteEvent::Lane {
            id: "done".into(),
            kind: EventKind::Delete,
            version: Version::new(3),
            lane: None,
        };
        let late = RemoteEvent::Lane {
            id: "done".into(),
            kind: EventKind::Update,
            version: Version::new(2),
            lane: Some(Lane::new("done", "Shipped", 1)),
        };

        assert_eq!(
            reconciler.receive(&mut store, confirmed, delete).unwrap(),
            ReconcileOutcome::Applied
        );
        assert!(matches!(
            reconciler.receive(&mut store, confirmed, late).unwrap(),
            ReconcileOutcome::Dropped(DropReason::Stale { .. })
        ));
        assert!(store.lane(&"done".into()).is_none());
    }

    #[test]
    fn test_update_for_unknown_card_inserts() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let outcome = reconciler
            .receive(&mut store, confirmed, update("c", 1, "C"))
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied);
        assert!(store.contains_card(&"c".into()));
    }

    #[test]
    fn test_insert_into_unknown_lane_is_rejected() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let event = RemoteEvent::Card {
            id: "c".into(),
            kind: EventKind::Insert,
            version: Version::new(1),
            card: Some(Card::new("c", "nowhere", 0, CardPayload::titled("C"))),
        };
        let err = reconciler.receive(&mut store, confirmed, event).unwrap_err();
        assert!(err.is_fatal());
        assert!(!store.contains_card(&"c".into()));
    }

    #[test]
    fn test_archived_update_removes_card() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let mut payload = CardPayload::titled("A");
        payload.archived = true;
        let event = RemoteEvent::Card {
            id: "a".into(),
            kind: EventKind::Update,
            version: Version::new(2),
            card: Some(Card::new("a", "waiting", 10, payload)),
        };
        assert_eq!(
            reconciler.receive(&mut store, confirmed, event).unwrap(),
            ReconcileOutcome::Applied
        );
        assert!(!store.contains_card(&"a".into()));
    }

    #[test]
    fn test_delete_ignores_version_and_absent_card() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        assert_eq!(
            reconciler.receive(&mut store, confirmed, delete("a", 0)).unwrap(),
            ReconcileOutcome::Applied
        );
        assert_eq!(
            reconciler.receive(&mut store, confirmed, delete("a", 0)).unwrap(),
            ReconcileOutcome::Dropped(DropReason::UnknownEntity)
        );
    }

    #[test]
    fn test_events_for_unconfirmed_card_are_buffered_and_replayed_in_order() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let busy = |id: &CardId| id.as_str() == "a";

        for v in [4, 2, 3] {
            let outcome = reconciler
                .receive(&mut store, busy, update("a", v, &format!("v{}", v)))
                .unwrap();
            assert_eq!(outcome, ReconcileOutcome::Buffered);
        }
        assert_eq!(reconciler.buffered_for(&"a".into()), 3);
        assert_eq!(store.card(&"a".into()).unwrap().title(), "A");

        let outcomes = reconciler.replay(&mut store, confirmed, &"a".into());
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| *o == ReconcileOutcome::Applied));
        assert_eq!(store.card(&"a".into()).unwrap().title(), "v4");
        assert_eq!(reconciler.buffered_for(&"a".into()), 0);
    }

    #[test]
    fn test_buffered_delete_supersedes_older_events() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let busy = |id: &CardId| id.as_str() == "a";

        reconciler.receive(&mut store, busy, update("a", 3, "x")).unwrap();
        reconciler.receive(&mut store, busy, delete("a", 4)).unwrap();
        assert_eq!(reconciler.buffered_for(&"a".into()), 1);
        assert_eq!(
            reconciler.receive(&mut store, busy, update("a", 2, "late")).unwrap(),
            ReconcileOutcome::Dropped(DropReason::Superseded)
        );

        reconciler.replay(&mut store, confirmed, &"a".into());
        assert!(!store.contains_card(&"a".into()));
        assert_eq!(reconciler.tombstone(&"a".into()), Some(Version::new(4)));

        // once confirmed, the card is no longer buffered; the tombstone holds
        assert!(matches!(
            reconciler.receive(&mut store, confirmed, update("a", 3, "late")).unwrap(),
            ReconcileOutcome::Dropped(DropReason::Stale { .. })
        ));
        assert!(!store.contains_card(&"a".into()));
    }

    #[test]
    fn test_card_renumber_is_deferred_while_a_card_is_busy() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let event = RemoteEvent::CardRenumber {
            lane: "waiting".into(),
            entries: vec![
                CardOrdinal {
                    card: "a".into(),
                    ordinal: Ordinal::from(1),
                    version: Version::new(2),
                },
                CardOrdinal {
                    card: "b".into(),
                    ordinal: Ordinal::from(0),
                    version: Version::new(2),
                },
            ],
        };
        let busy = |id: &CardId| id.as_str() == "b";

        assert_eq!(
            reconciler.receive(&mut store, busy, event).unwrap(),
            ReconcileOutcome::Deferred
        );
        assert_eq!(store.card(&"a".into()).unwrap().ordinal, Ordinal::from(10));

        let outcomes = reconciler.replay(&mut store, confirmed, &"b".into());
        assert_eq!(outcomes, vec![ReconcileOutcome::Applied]);
        assert_eq!(reconciler.deferred_len(), 0);
        let order: Vec<_> = store
            .lane_cards(&"waiting".into())
            .into_iter()
            .map(|c| c.id.to_string())
            .collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_card_renumber_keeps_newer_local_entries() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let event = RemoteEvent::CardRenumber {
            lane: "waiting".into(),
            entries: vec![CardOrdinal {
                card: "a".into(),
                ordinal: Ordinal::from(99),
                version: Version::new(1),
            }],
        };
        assert_eq!(
            reconciler.receive(&mut store, confirmed, event).unwrap(),
            ReconcileOutcome::Dropped(DropReason::NoNewerEntries)
        );
        assert_eq!(store.card(&"a".into()).unwrap().ordinal, Ordinal::from(10));
    }

    #[test]
    fn test_lane_renumber_swaps_lanes() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let event = RemoteEvent::LaneRenumber {
            entries: vec![
                LaneOrdinal {
                    lane: "waiting".into(),
                    ordinal: Ordinal::from(1),
                    version: Version::new(2),
                },
                LaneOrdinal {
                    lane: "done".into(),
                    ordinal: Ordinal::from(0),
                    version: Version::new(2),
                },
            ],
        };
        assert_eq!(
            reconciler.receive(&mut store, confirmed, event).unwrap(),
            ReconcileOutcome::Applied
        );
        let lanes: Vec<_> = store.lanes().iter().map(|l| l.id.to_string()).collect();
        assert_eq!(lanes, vec!["done", "waiting"]);
        assert_eq!(store.lane(&"done".into()).unwrap().version, Version::new(2));
    }

    #[test]
    fn test_lane_delete_of_non_empty_lane_is_rejected() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let event = RemoteEvent::Lane {
            id: "waiting".into(),
            kind: EventKind::Delete,
            version: Version::new(2),
            lane: None,
        };
        let err = reconciler.receive(&mut store, confirmed, event).unwrap_err();
        assert!(matches!(err, BoardError::LaneNotEmpty { count: 2, .. }));
    }

    #[test]
    fn test_stale_lane_update_is_dropped() {
        let mut store = store();
        let mut reconciler = Reconciler::new();
        let event = RemoteEvent::Lane {
            id: "done".into(),
            kind: EventKind::Update,
            version: Version::new(1),
            lane: Some(Lane::new("done", "Shipped", 1)),
        };
        assert!(matches!(
            reconciler.receive(&mut store, confirmed, event).unwrap(),
            ReconcileOutcome::Dropped(DropReason::Stale { .. })
        ));
        assert_eq!(store.lane(&"done".into()).unwrap().name, "Done");
    }

    #[test]
    fn test_event_wire_format() {
        let json = r#"{
            "type": "card",
            "id": "a",
            "kind": "update",
            "version": 3,
            "card": {"id": "a", "lane": "waiting", "ordinal": 1.5, "payload": {"title": "A"}}
        }"#;
        let event: RemoteEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.version(), Version::new(3));
        assert_eq!(event.kind(), "card");
    }
}

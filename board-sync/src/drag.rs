//! Drag session state machine.
//!
//! ```text
//! Idle --pointer_down--> Armed --pointer_move (> threshold)--> Dragging
//!  ^                       |                                     |
//!  |                    release (click)                       release
//!  |                       v                                     v
//!  +------------------- Idle <-------- finish ------------- Resolving
//! ```
//!
//! While dragging, every change of hover target recomputes the drop index
//! against the lane as currently rendered and pushes a [`Preview`] into the
//! store. Cancelling before release clears the preview, which leaves the
//! committed board exactly as it was before the drag.

use crate::allocator;
use crate::error::{BoardError, Result};
use crate::store::{BoardStore, Change, Preview};
use crate::types::{CardId, LaneId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pointer position in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn distance_to(self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Which side of a hovered card the pointer is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Before,
    After,
}

/// What the pointer is currently over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoverTarget {
    /// Empty area of a lane: drop at its end
    Lane(LaneId),
    /// Next to another card
    Card { card: CardId, edge: Edge },
}

/// Finalized placement handed to the mutation pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropTarget {
    pub card: CardId,
    pub lane: LaneId,
    pub index: usize,
}

/// Result of releasing the pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// The card was dropped and must be committed
    Drop(DropTarget),
    /// The pointer never travelled far enough: treat as a click
    Click(CardId),
    /// Dragged but released before hovering anything
    NoTarget(CardId),
}

/// Public view of the controller's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragPhase {
    Idle,
    Armed,
    Dragging,
    Resolving,
}

impl fmt::Display for DragPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Dragging => "dragging",
            Self::Resolving => "resolving",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
enum DragState {
    Idle,
    Armed {
        card: CardId,
        origin: Point,
    },
    Dragging {
        card: CardId,
        hover: Option<HoverTarget>,
        placement: Option<(LaneId, usize)>,
    },
    Resolving {
        target: DropTarget,
    },
}

/// Tracks the lifecycle of one drag gesture at a time
#[derive(Debug, Clone)]
pub struct DragController {
    state: DragState,
    activation_distance: f64,
}

impl DragController {
    /// Create an idle controller
    pub fn new(activation_distance: f64) -> Self {
        Self {
            state: DragState::Idle,
            activation_distance,
        }
    }

    /// Current phase
    pub fn phase(&self) -> DragPhase {
        match self.state {
            DragState::Idle => DragPhase::Idle,
            DragState::Armed { .. } => DragPhase::Armed,
            DragState::Dragging { .. } => DragPhase::Dragging,
            DragState::Resolving { .. } => DragPhase::Resolving,
        }
    }

    /// The card being pressed or dragged, if any
    pub fn active_card(&self) -> Option<&CardId> {
        match &self.state {
            DragState::Idle => None,
            DragState::Armed { card, .. } | DragState::Dragging { card, .. } => Some(card),
            DragState::Resolving { target } => Some(&target.card),
        }
    }

    /// Pointer pressed on a card
    pub fn pointer_down(&mut self, store: &BoardStore, card: CardId, at: Point) -> Result<()> {
        self.ensure_idle()?;
        if !store.contains_card(&card) {
            return Err(BoardError::card_not_found(&card));
        }
        tracing::debug!(card = %card, "drag armed");
        self.state = DragState::Armed { card, origin: at };
        Ok(())
    }

    /// Keyboard pick-up: starts dragging immediately
    pub fn key_pick_up(&mut self, store: &BoardStore, card: CardId) -> Result<()> {
        self.ensure_idle()?;
        if !store.contains_card(&card) {
            return Err(BoardError::card_not_found(&card));
        }
        tracing::debug!(card = %card, "drag started from keyboard");
        self.state = DragState::Dragging {
            card,
            hover: None,
            placement: None,
        };
        Ok(())
    }

    /// Pointer moved. Activates the drag once the threshold is exceeded.
    ///
    /// Moves outside an armed session are ignored.
    pub fn pointer_move(&mut self, at: Point) -> DragPhase {
        if let DragState::Armed { card, origin } = &self.state {
            if origin.distance_to(at) > self.activation_distance {
                let card = card.clone();
                tracing::debug!(card = %card, "drag activated");
                self.state = DragState::Dragging {
                    card,
                    hover: None,
                    placement: None,
                };
            }
        }
        self.phase()
    }

    /// Hover target changed while dragging.
    ///
    /// Returns the preview pushed into the store, or `None` when the target
    /// is unchanged or is the dragged card itself.
    pub fn hover(
        &mut self,
        store: &mut BoardStore,
        target: HoverTarget,
        ordinal_step: f64,
    ) -> Result<Option<Preview>> {
        let (card, hover, placement) = match &mut self.state {
            DragState::Dragging {
                card,
                hover,
                placement,
            } => (card, hover, placement),
            _ => return Err(self.invalid("hover")),
        };
        let card = &*card;
        if hover.as_ref() == Some(&target) {
            return Ok(None);
        }

        let (lane, anchor) = match &target {
            HoverTarget::Lane(lane) => {
                if store.lane(lane).is_none() {
                    return Err(BoardError::lane_not_found(lane));
                }
                (lane.clone(), None)
            }
            HoverTarget::Card { card: over, .. } if over == card => return Ok(None),
            HoverTarget::Card { card: over, edge } => {
                let lane = store
                    .card(over)
                    .map(|c| c.lane.clone())
                    .ok_or_else(|| BoardError::card_not_found(over))?;
                (lane, Some((over, *edge)))
            }
        };

        let others: Vec<_> = store
            .rendered_lane(&lane)
            .into_iter()
            .filter(|c| &c.id != card)
            .collect();
        let index = match anchor {
            None => others.len(),
            Some((over, edge)) => {
                let position = others
                    .iter()
                    .position(|c| &c.id == over)
                    .ok_or_else(|| BoardError::card_not_found(over))?;
                match edge {
                    Edge::Before => position,
                    Edge::After => position + 1,
                }
            }
        };

        let preview = Preview {
            card: card.clone(),
            lane: lane.clone(),
            index,
            provisional_ordinal: allocator::allocate(&others, index, ordinal_step).ok(),
        };
        store.apply(Change::SetPreview(preview.clone()))?;
        tracing::trace!(card = %card, lane = %lane, index, "drag preview updated");

        *hover = Some(target);
        *placement = Some((lane, index));
        Ok(Some(preview))
    }

    /// Pointer released
    pub fn release(&mut self) -> Result<Release> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Armed { card, .. } => Ok(Release::Click(card)),
            DragState::Dragging {
                card,
                placement: None,
                ..
            } => {
                tracing::debug!(card = %card, "drag released without a target");
                Ok(Release::NoTarget(card))
            }
            DragState::Dragging {
                card,
                placement: Some((lane, index)),
                ..
            } => {
                let target = DropTarget { card, lane, index };
                tracing::debug!(card = %target.card, lane = %target.lane, index, "drag released");
                self.state = DragState::Resolving {
                    target: target.clone(),
                };
                Ok(Release::Drop(target))
            }
            other => {
                self.state = other;
                Err(self.invalid("release"))
            }
        }
    }

    /// The drop was handed to the pipeline: clear the preview and go idle
    pub fn finish(&mut self, store: &mut BoardStore) -> Result<DropTarget> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Resolving { target } => {
                store.apply(Change::ClearPreview)?;
                Ok(target)
            }
            other => {
                self.state = other;
                Err(self.invalid("finish"))
            }
        }
    }

    /// Abort the gesture before release, restoring the pre-drag rendering.
    ///
    /// Returns the card whose drag was cancelled; cancelling while idle is a no-op.
    pub fn cancel(&mut self, store: &mut BoardStore) -> Result<Option<CardId>> {
        match std::mem::replace(&mut self.state, DragState::Idle) {
            DragState::Idle => Ok(None),
            DragState::Armed { card, .. } | DragState::Dragging { card, .. } => {
                store.apply(Change::ClearPreview)?;
                tracing::debug!(card = %card, "drag cancelled");
                Ok(Some(card))
            }
            other => {
                self.state = other;
                Err(self.invalid("cancel"))
            }
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.state {
            DragState::Idle => Ok(()),
            _ => Err(BoardError::DragRejected {
                state: self.phase().to_string(),
            }),
        }
    }

    fn invalid(&self, event: &str) -> BoardError {
        BoardError::InvalidTransition {
            state: self.phase().to_string(),
            event: event.to_string(),
        }
    }
}

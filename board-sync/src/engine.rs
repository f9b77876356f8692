//! BoardEngine - wires the store, drag controller, pipeline and reconciler
//!
//! Everything here is synchronous. [`crate::runtime`] owns an engine inside a
//! tokio task and performs the awaited storage calls; tests drive the engine
//! directly and hand `settle` whatever storage answer they want.

use crate::config::EngineConfig;
use crate::drag::{DragController, DragPhase, DropTarget, HoverTarget, Point, Release};
use crate::error::{BoardError, Result};
use crate::pipeline::{CommitOutcome, MutationKind, MutationPipeline, PreparedWrite};
use crate::reconcile::{ReconcileOutcome, Reconciler, RemoteEvent};
use crate::storage::PersistFailure;
use crate::store::{BoardSnapshot, BoardStore, Preview};
use crate::types::{Card, CardId, CardPayload, Lane, LaneId, Version};

/// What releasing the pointer led to
#[derive(Debug, Clone, PartialEq)]
pub enum Released {
    /// The drop was applied optimistically; `write` must go to storage
    Committed {
        target: DropTarget,
        write: PreparedWrite,
    },
    Click(CardId),
    NoTarget(CardId),
}

/// A settled mutation plus the remote events it released
#[derive(Debug, Clone, PartialEq)]
pub struct Settled {
    pub outcome: CommitOutcome,
    pub replayed: Vec<ReconcileOutcome>,
}

/// The board engine
#[derive(Debug)]
pub struct BoardEngine {
    config: EngineConfig,
    store: BoardStore,
    drag: DragController,
    pipeline: MutationPipeline,
    reconciler: Reconciler,
}

impl BoardEngine {
    /// Create an engine over an empty board
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_store(config, BoardStore::new())
    }

    /// Create an engine over an already loaded board.
    ///
    /// Fails with [`BoardError::Config`] when `config` does not validate.
    pub fn with_store(config: EngineConfig, store: BoardStore) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            drag: DragController::new(config.activation_distance),
            config,
            store,
            pipeline: MutationPipeline::new(),
            reconciler: Reconciler::new(),
        })
    }

    /// Replace the board with a fresh fetch. Any drag in progress is dropped.
    pub fn load(&mut self, lanes: Vec<Lane>, cards: Vec<Card>) -> Result<()> {
        self.store = BoardStore::load(lanes, cards)?;
        self.drag = DragController::new(self.config.activation_distance);
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn snapshot(&self) -> BoardSnapshot {
        self.store.snapshot()
    }

    pub fn drag_phase(&self) -> DragPhase {
        self.drag.phase()
    }

    /// Whether the card has a mutation awaiting storage
    pub fn is_unconfirmed(&self, card: &CardId) -> bool {
        self.pipeline.is_unconfirmed(card)
    }

    // =========================================================================
    // Gestures
    // =========================================================================

    pub fn pointer_down(&mut self, card: CardId, at: Point) -> Result<()> {
        self.ensure_settled(&card)?;
        self.drag.pointer_down(&self.store, card, at)
    }

    pub fn key_pick_up(&mut self, card: CardId) -> Result<()> {
        self.ensure_settled(&card)?;
        self.drag.key_pick_up(&self.store, card)
    }

    pub fn pointer_move(&mut self, at: Point) -> DragPhase {
        self.drag.pointer_move(at)
    }

    pub fn hover(&mut self, target: HoverTarget) -> Result<Option<Preview>> {
        self.drag
            .hover(&mut self.store, target, self.config.ordinal_step)
    }

    /// Release the pointer. A drop goes straight into the pipeline.
    ///
    /// The drag always ends here; if the pipeline refuses the drop the
    /// preview is cleared and the error returned.
    pub fn release(&mut self) -> Result<Released> {
        let target = match self.drag.release()? {
            Release::Drop(target) => target,
            Release::Click(card) => return Ok(Released::Click(card)),
            Release::NoTarget(card) => return Ok(Released::NoTarget(card)),
        };

        let write = self.pipeline.begin_move(
            &mut self.store,
            &target.card,
            &target.lane,
            target.index,
            self.config.ordinal_step,
        );
        let target = self.drag.finish(&mut self.store)?;
        Ok(Released::Committed {
            target,
            write: write?,
        })
    }

    /// Abort the gesture; the board renders as it did before the drag
    pub fn cancel_drag(&mut self) -> Result<Option<CardId>> {
        self.drag.cancel(&mut self.store)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Move a card without a gesture (keyboard shortcut, API call)
    pub fn begin_move(
        &mut self,
        card: &CardId,
        lane: &LaneId,
        index: usize,
    ) -> Result<PreparedWrite> {
        self.pipeline
            .begin_move(&mut self.store, card, lane, index, self.config.ordinal_step)
    }

    pub fn begin_edit(&mut self, card: &CardId, payload: CardPayload) -> Result<PreparedWrite> {
        self.pipeline.begin_edit(&mut self.store, card, payload)
    }

    pub fn begin_archive(&mut self, card: &CardId) -> Result<PreparedWrite> {
        self.cancel_drag_of(card)?;
        self.pipeline.begin_archive(&mut self.store, card)
    }

    /// Apply storage's answer, then replay remote events held for the card
    pub fn settle(
        &mut self,
        card: &CardId,
        result: std::result::Result<Version, PersistFailure>,
    ) -> Result<Settled> {
        let outcome = self.pipeline.settle(&mut self.store, card, result);
        if let Ok(CommitOutcome::Confirmed {
            kind: MutationKind::Archive,
            version,
            ..
        }) = &outcome
        {
            self.reconciler.record_removal(card, *version);
        }

        // held events are released whatever the outcome
        let pipeline = &self.pipeline;
        let replayed = self
            .reconciler
            .replay(&mut self.store, |id| pipeline.is_unconfirmed(id), card);
        if let Err(e) = self.cancel_orphaned_drag() {
            tracing::warn!(card = %card, error = %e, "could not cancel orphaned drag");
        }
        Ok(Settled {
            outcome: outcome?,
            replayed,
        })
    }

    // =========================================================================
    // Remote events
    // =========================================================================

    /// Fold in a change notification from another actor
    pub fn receive_remote(&mut self, event: RemoteEvent) -> Result<ReconcileOutcome> {
        let pipeline = &self.pipeline;
        let outcome = self
            .reconciler
            .receive(&mut self.store, |id| pipeline.is_unconfirmed(id), event)?;
        self.cancel_orphaned_drag()?;
        Ok(outcome)
    }

    fn ensure_settled(&self, card: &CardId) -> Result<()> {
        if self.pipeline.is_unconfirmed(card) {
            return Err(BoardError::CardBusy {
                id: card.to_string(),
            });
        }
        Ok(())
    }

    fn cancel_drag_of(&mut self, card: &CardId) -> Result<()> {
        if self.drag.active_card() == Some(card) {
            self.drag.cancel(&mut self.store)?;
        }
        Ok(())
    }

    /// A remote delete can pull the dragged card out from under the pointer
    fn cancel_orphaned_drag(&mut self) -> Result<()> {
        let orphaned = self
            .drag
            .active_card()
            .is_some_and(|card| !self.store.contains_card(card));
        if orphaned {
            if let Some(card) = self.drag.cancel(&mut self.store)? {
                tracing::info!(card = %card, "drag cancelled: card was removed");
            }
        }
        Ok(())
    }
}

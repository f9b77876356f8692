//! Event loop that owns a [`BoardEngine`].
//!
//! One tokio task processes gestures, commit requests, remote events and
//! write completions one at a time, so the store needs no locks. Durable
//! writes run in their own tasks and report back through a settlement
//! channel; nothing the loop does ever waits on storage.
//!
//! Callers talk to the loop through a cloneable [`EngineHandle`] and read the
//! board from a `watch` channel of immutable snapshots.

use crate::drag::{DragPhase, DropTarget, HoverTarget, Point};
use crate::engine::{BoardEngine, Released};
use crate::error::{BoardError, Result};
use crate::pipeline::{CommitOutcome, PreparedWrite};
use crate::reconcile::{ReconcileOutcome, RemoteEvent};
use crate::storage::{BoardStorage, PersistFailure};
use crate::store::{BoardSnapshot, Preview};
use crate::types::{Card, CardId, CardPayload, Lane, LaneId, Version};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Something the UI may want to surface (toast, WIP badge, conflict banner)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineNotice {
    /// A local mutation was confirmed or rolled back
    Settled { outcome: CommitOutcome },
    /// A remote event was handled
    Remote { outcome: ReconcileOutcome },
}

/// Sends [`EngineNotice`]s to whoever listens
#[derive(Debug, Clone)]
pub struct NoticeSender {
    sender: mpsc::UnboundedSender<EngineNotice>,
}

impl NoticeSender {
    pub fn new(sender: mpsc::UnboundedSender<EngineNotice>) -> Self {
        Self { sender }
    }

    /// Send a notice; a closed receiver is not an error for the engine
    pub fn send(&self, notice: EngineNotice) {
        if self.sender.send(notice).is_err() {
            tracing::debug!("notice receiver dropped");
        }
    }
}

/// A mutation accepted by the engine, awaiting storage
#[derive(Debug)]
pub struct PendingCommit {
    card: CardId,
    outcome: oneshot::Receiver<CommitOutcome>,
}

impl PendingCommit {
    pub fn card(&self) -> &CardId {
        &self.card
    }

    /// Wait for storage's verdict
    pub async fn outcome(self) -> Result<CommitOutcome> {
        self.outcome.await.map_err(|_| BoardError::EngineClosed)
    }
}

/// What releasing the pointer led to, as seen through a handle
#[derive(Debug)]
pub enum ReleaseOutcome {
    Committed {
        target: DropTarget,
        pending: PendingCommit,
    },
    Click(CardId),
    NoTarget(CardId),
}

enum Mutation {
    Move {
        card: CardId,
        lane: LaneId,
        index: usize,
    },
    Edit {
        card: CardId,
        payload: CardPayload,
    },
    Archive {
        card: CardId,
    },
}

enum EngineMessage {
    PointerDown {
        card: CardId,
        at: Point,
        reply: oneshot::Sender<Result<()>>,
    },
    KeyPickUp {
        card: CardId,
        reply: oneshot::Sender<Result<()>>,
    },
    PointerMove {
        at: Point,
        reply: oneshot::Sender<DragPhase>,
    },
    Hover {
        target: HoverTarget,
        reply: oneshot::Sender<Result<Option<Preview>>>,
    },
    Release {
        reply: oneshot::Sender<Result<ReleaseOutcome>>,
    },
    CancelDrag {
        reply: oneshot::Sender<Result<Option<CardId>>>,
    },
    Commit {
        mutation: Mutation,
        reply: oneshot::Sender<Result<PendingCommit>>,
    },
    Remote {
        event: RemoteEvent,
        reply: Option<oneshot::Sender<Result<ReconcileOutcome>>>,
    },
    Load {
        lanes: Vec<Lane>,
        cards: Vec<Card>,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

/// A finished durable write
struct WriteSettled {
    card: CardId,
    result: std::result::Result<Version, PersistFailure>,
}

/// Builds and spawns the event loop
pub struct EngineRuntime {
    engine: BoardEngine,
    storage: Arc<dyn BoardStorage>,
    notices: Option<NoticeSender>,
}

impl EngineRuntime {
    pub fn new(engine: BoardEngine, storage: Arc<dyn BoardStorage>) -> Self {
        Self {
            engine,
            storage,
            notices: None,
        }
    }

    /// Publish notices for settled mutations and handled remote events
    pub fn with_notices(mut self, notices: NoticeSender) -> Self {
        self.notices = Some(notices);
        self
    }

    /// Spawn the loop on the current tokio runtime
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (sender, inbox) = mpsc::channel(self.engine.config().queue_capacity);
        let (settled_tx, settled) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(Arc::new(self.engine.snapshot()));

        let event_loop = EngineLoop {
            write_timeout: self.engine.config().write_timeout(),
            engine: self.engine,
            storage: self.storage,
            notices: self.notices,
            inbox,
            settled,
            settled_tx,
            snapshots,
            waiting: HashMap::new(),
            closing: false,
        };
        let task = tokio::spawn(event_loop.run());
        let handle = EngineHandle {
            sender,
            snapshots: snapshot_rx,
        };
        (handle, task)
    }
}

/// Cloneable handle to a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
    snapshots: watch::Receiver<Arc<BoardSnapshot>>,
}

impl EngineHandle {
    /// Spawn an engine without notices
    pub fn spawn(engine: BoardEngine, storage: Arc<dyn BoardStorage>) -> (Self, JoinHandle<()>) {
        EngineRuntime::new(engine, storage).spawn()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Receiver notified whenever the rendered board changes
    pub fn subscribe(&self) -> watch::Receiver<Arc<BoardSnapshot>> {
        self.snapshots.clone()
    }

    pub async fn pointer_down(&self, card: CardId, at: Point) -> Result<()> {
        self.request(|reply| EngineMessage::PointerDown { card, at, reply })
            .await?
    }

    pub async fn key_pick_up(&self, card: CardId) -> Result<()> {
        self.request(|reply| EngineMessage::KeyPickUp { card, reply })
            .await?
    }

    pub async fn pointer_move(&self, at: Point) -> Result<DragPhase> {
        self.request(|reply| EngineMessage::PointerMove { at, reply })
            .await
    }

    pub async fn hover(&self, target: HoverTarget) -> Result<Option<Preview>> {
        self.request(|reply| EngineMessage::Hover { target, reply })
            .await?
    }

    /// Release the pointer; a drop is dispatched to storage immediately
    pub async fn release(&self) -> Result<ReleaseOutcome> {
        self.request(|reply| EngineMessage::Release { reply }).await?
    }

    pub async fn cancel_drag(&self) -> Result<Option<CardId>> {
        self.request(|reply| EngineMessage::CancelDrag { reply })
            .await?
    }

    /// Move a card; fails with `CardBusy` while its previous mutation is unsettled
    pub async fn commit_move(
        &self,
        card: CardId,
        lane: LaneId,
        index: usize,
    ) -> Result<PendingCommit> {
        self.commit(Mutation::Move { card, lane, index }).await
    }

    pub async fn commit_edit(&self, card: CardId, payload: CardPayload) -> Result<PendingCommit> {
        self.commit(Mutation::Edit { card, payload }).await
    }

    pub async fn commit_archive(&self, card: CardId) -> Result<PendingCommit> {
        self.commit(Mutation::Archive { card }).await
    }

    /// Hand one remote change notification to the engine
    pub async fn ingest(&self, event: RemoteEvent) -> Result<ReconcileOutcome> {
        self.request(|reply| EngineMessage::Remote {
            event,
            reply: Some(reply),
        })
        .await?
    }

    /// Forward a remote change stream into the engine until it ends.
    ///
    /// The forwarder keeps the engine alive for as long as the stream is open.
    pub fn forward_remote(&self, mut events: mpsc::Receiver<RemoteEvent>) -> JoinHandle<()> {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let message = EngineMessage::Remote { event, reply: None };
                if sender.send(message).await.is_err() {
                    tracing::debug!("engine closed, remote forwarder stopping");
                    break;
                }
            }
        })
    }

    /// Replace the board with a fresh fetch
    pub async fn load(&self, lanes: Vec<Lane>, cards: Vec<Card>) -> Result<()> {
        self.request(|reply| EngineMessage::Load {
            lanes,
            cards,
            reply,
        })
        .await?
    }

    /// Stop accepting messages. Writes already dispatched still settle.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EngineMessage::Shutdown)
            .await
            .map_err(|_| BoardError::EngineClosed)
    }

    async fn commit(&self, mutation: Mutation) -> Result<PendingCommit> {
        self.request(|reply| EngineMessage::Commit { mutation, reply })
            .await?
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineMessage,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| BoardError::EngineClosed)?;
        response.await.map_err(|_| BoardError::EngineClosed)
    }
}

struct EngineLoop {
    engine: BoardEngine,
    storage: Arc<dyn BoardStorage>,
    notices: Option<NoticeSender>,
    write_timeout: Option<Duration>,
    inbox: mpsc::Receiver<EngineMessage>,
    settled: mpsc::UnboundedReceiver<WriteSettled>,
    settled_tx: mpsc::UnboundedSender<WriteSettled>,
    snapshots: watch::Sender<Arc<BoardSnapshot>>,
    waiting: HashMap<CardId, oneshot::Sender<CommitOutcome>>,
    closing: bool,
}

impl EngineLoop {
    async fn run(mut self) {
        tracing::debug!("board engine started");
        loop {
            tokio::select! {
                Some(settled) = self.settled.recv() => self.on_settled(settled),
                message = self.inbox.recv(), if !self.closing => match message {
                    Some(EngineMessage::Shutdown) | None => self.closing = true,
                    Some(message) => self.handle(message),
                },
            }
            self.publish();
            if self.closing && self.waiting.is_empty() {
                break;
            }
        }
        tracing::debug!("board engine stopped");
    }

    fn handle(&mut self, message: EngineMessage) {
        match message {
            EngineMessage::PointerDown { card, at, reply } => {
                let result = self.engine.pointer_down(card, at);
                self.reply(reply, result);
            }
            EngineMessage::KeyPickUp { card, reply } => {
                let result = self.engine.key_pick_up(card);
                self.reply(reply, result);
            }
            EngineMessage::PointerMove { at, reply } => {
                let result = self.engine.pointer_move(at);
                self.reply(reply, result);
            }
            EngineMessage::Hover { target, reply } => {
                let result = self.engine.hover(target);
                self.reply(reply, result);
            }
            EngineMessage::Release { reply } => {
                let result = self.engine.release().map(|released| match released {
                    Released::Committed { target, write } => ReleaseOutcome::Committed {
                        target,
                        pending: self.dispatch(write),
                    },
                    Released::Click(card) => ReleaseOutcome::Click(card),
                    Released::NoTarget(card) => ReleaseOutcome::NoTarget(card),
                });
                self.reply(reply, result);
            }
            EngineMessage::CancelDrag { reply } => {
                let result = self.engine.cancel_drag();
                self.reply(reply, result);
            }
            EngineMessage::Commit { mutation, reply } => {
                let prepared = match mutation {
                    Mutation::Move { card, lane, index } => {
                        self.engine.begin_move(&card, &lane, index)
                    }
                    Mutation::Edit { card, payload } => self.engine.begin_edit(&card, payload),
                    Mutation::Archive { card } => self.engine.begin_archive(&card),
                };
                let result = prepared.map(|write| self.dispatch(write));
                self.reply(reply, result);
            }
            EngineMessage::Remote { event, reply } => {
                let result = self.engine.receive_remote(event);
                match &result {
                    Ok(outcome) => self.notify(EngineNotice::Remote {
                        outcome: outcome.clone(),
                    }),
                    Err(e) => tracing::warn!(error = %e, "remote event rejected"),
                }
                if let Some(reply) = reply {
                    self.reply(reply, result);
                }
            }
            EngineMessage::Load { lanes, cards, reply } => {
                let result = self.engine.load(lanes, cards);
                self.reply(reply, result);
            }
            EngineMessage::Shutdown => self.closing = true,
        }
    }

    /// Spawn the durable write for a mutation already applied locally
    fn dispatch(&mut self, write: PreparedWrite) -> PendingCommit {
        let PreparedWrite {
            kind,
            request,
            renumber,
        } = write;
        let card = request.card_id.clone();
        let (done, outcome) = oneshot::channel();
        self.waiting.insert(card.clone(), done);

        let storage = Arc::clone(&self.storage);
        let settled = self.settled_tx.clone();
        let timeout = self.write_timeout;
        let task_card = card.clone();
        tracing::debug!(card = %card, %kind, "dispatching durable write");
        tokio::spawn(async move {
            let persist = async move {
                if let Some(renumber) = renumber {
                    storage
                        .renumber_lane(renumber)
                        .await
                        .map_err(|e| PersistFailure::Transport(e.to_string()))?;
                }
                storage.write_card(request).await.into_result()
            };
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, persist)
                    .await
                    .unwrap_or(Err(PersistFailure::TimedOut)),
                None => persist.await,
            };
            let settled_write = WriteSettled {
                card: task_card,
                result,
            };
            if settled.send(settled_write).is_err() {
                tracing::debug!("engine gone before write settled");
            }
        });

        PendingCommit { card, outcome }
    }

    fn on_settled(&mut self, settled: WriteSettled) {
        let waiter = self.waiting.remove(&settled.card);
        match self.engine.settle(&settled.card, settled.result) {
            Ok(result) => {
                self.notify(EngineNotice::Settled {
                    outcome: result.outcome.clone(),
                });
                for outcome in result.replayed {
                    self.notify(EngineNotice::Remote { outcome });
                }
                if let Some(waiter) = waiter {
                    self.reply(waiter, result.outcome);
                }
            }
            // only reachable with no mutation tracked for the card
            Err(e) => tracing::error!(card = %settled.card, error = %e, "could not settle write"),
        }
    }

    /// Publish first so a caller woken by the reply sees the matching snapshot
    fn reply<T>(&self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }

    fn notify(&self, notice: EngineNotice) {
        if let Some(notices) = &self.notices {
            notices.send(notice);
        }
    }

    fn publish(&self) {
        let snapshot = self.engine.snapshot();
        self.snapshots.send_if_modified(|current| {
            if **current == snapshot {
                return false;
            }
            *current = Arc::new(snapshot);
            true
        });
    }
}

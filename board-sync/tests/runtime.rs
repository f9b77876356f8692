//! Event-loop tests against a scripted in-memory storage.

use async_trait::async_trait;
use board_sync::storage::{RejectReason, StorageFailure};
use board_sync::{
    BoardEngine, BoardError, BoardStorage, BoardStore, Card, CardId, CardPayload, CommitOutcome,
    DragPhase, EngineConfig, EngineHandle, EngineNotice, EngineRuntime, EventKind, HoverTarget,
    Lane, NoticeSender, PersistFailure, Point, ReconcileOutcome, ReleaseOutcome, RemoteEvent,
    RenumberRequest, Version, WriteRequest, WriteResponse,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};

/// Storage that answers from a script and records what it was asked
struct ScriptedStorage {
    responses: Mutex<VecDeque<WriteResponse>>,
    writes: Mutex<Vec<WriteRequest>>,
    renumbers: Mutex<Vec<RenumberRequest>>,
    /// When set, each write waits for one permit
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
}

impl ScriptedStorage {
    fn new(responses: impl IntoIterator<Item = WriteResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            writes: Mutex::new(Vec::new()),
            renumbers: Mutex::new(Vec::new()),
            gate: None,
            delay: None,
        }
    }

    fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl BoardStorage for ScriptedStorage {
    async fn write_card(&self, request: WriteRequest) -> WriteResponse {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.writes.lock().await.push(request);
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| WriteResponse::transport_error("script exhausted"))
    }

    async fn renumber_lane(&self, request: RenumberRequest) -> Result<(), StorageFailure> {
        self.renumbers.lock().await.push(request);
        Ok(())
    }
}

fn board() -> BoardEngine {
    let store = BoardStore::load(
        vec![
            Lane::new("waiting", "Waiting", 0),
            Lane::new("active", "Active", 1).with_capacity(2),
        ],
        vec![
            Card::new("a", "waiting", 10, CardPayload::titled("A")).with_version(1),
            Card::new("b", "waiting", 20, CardPayload::titled("B")).with_version(1),
        ],
    )
    .unwrap();
    BoardEngine::with_store(EngineConfig::default(), store).unwrap()
}

fn lane_order(handle: &EngineHandle, lane: &str) -> Vec<String> {
    handle.snapshot().lane_order(&lane.into())
}

#[test_log::test(tokio::test)]
async fn test_commit_move_confirms_and_publishes() {
    let storage = Arc::new(ScriptedStorage::new([WriteResponse::ok(2)]));
    let (handle, _task) = EngineHandle::spawn(board(), storage.clone());

    let pending = handle
        .commit_move("a".into(), "active".into(), 0)
        .await
        .unwrap();
    assert_eq!(lane_order(&handle, "active"), vec!["a"]);

    let outcome = pending.outcome().await.unwrap();
    assert!(outcome.is_confirmed());
    assert_eq!(
        handle.snapshot().card(&"a".into()).unwrap().version,
        Version::new(2)
    );

    let writes = storage.writes.lock().await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].expected_prior_version, Version::new(1));
}

#[test_log::test(tokio::test)]
async fn test_conflict_rolls_back_published_state() {
    let storage = Arc::new(ScriptedStorage::new([WriteResponse::rejected(
        RejectReason::Conflict,
    )]));
    let (handle, _task) = EngineHandle::spawn(board(), storage);
    let before = handle.snapshot();

    let pending = handle
        .commit_move("a".into(), "waiting".into(), 1)
        .await
        .unwrap();
    assert_eq!(lane_order(&handle, "waiting"), vec!["b", "a"]);

    let outcome = pending.outcome().await.unwrap();
    assert_eq!(outcome.failure(), Some(&PersistFailure::Conflict));
    assert_eq!(*handle.snapshot(), *before);
}

#[test_log::test(tokio::test)]
async fn test_same_card_is_busy_while_write_is_pending() {
    let gate = Arc::new(Semaphore::new(0));
    let storage = Arc::new(
        ScriptedStorage::new([WriteResponse::ok(2), WriteResponse::ok(2)]).with_gate(gate.clone()),
    );
    let (handle, _task) = EngineHandle::spawn(board(), storage);

    let first = handle
        .commit_move("a".into(), "active".into(), 0)
        .await
        .unwrap();
    let err = handle
        .commit_move("a".into(), "waiting".into(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::CardBusy { .. }));

    // a different card is not held up
    let second = handle
        .commit_edit("b".into(), CardPayload::titled("B2"))
        .await
        .unwrap();

    gate.add_permits(2);
    assert!(first.outcome().await.unwrap().is_confirmed());
    assert!(second.outcome().await.unwrap().is_confirmed());
}

#[test_log::test(tokio::test)]
async fn test_remote_delete_waits_for_pending_move() {
    let gate = Arc::new(Semaphore::new(0));
    let storage = Arc::new(ScriptedStorage::new([WriteResponse::ok(2)]).with_gate(gate.clone()));
    let (handle, _task) = EngineHandle::spawn(board(), storage);

    let pending = handle
        .commit_move("a".into(), "active".into(), 0)
        .await
        .unwrap();
    let outcome = handle
        .ingest(RemoteEvent::Card {
            id: "a".into(),
            kind: EventKind::Delete,
            version: Version::new(3),
            card: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Buffered);
    assert_eq!(lane_order(&handle, "active"), vec!["a"]);

    gate.add_permits(1);
    assert!(pending.outcome().await.unwrap().is_confirmed());
    assert!(lane_order(&handle, "active").is_empty());
}

#[test_log::test(tokio::test)]
async fn test_rejected_move_out_of_deleted_lane_still_answers() {
    let gate = Arc::new(Semaphore::new(0));
    let storage = Arc::new(
        ScriptedStorage::new([
            WriteResponse::rejected(RejectReason::Conflict),
            WriteResponse::rejected(RejectReason::Conflict),
        ])
        .with_gate(gate.clone()),
    );
    let (handle, _task) = EngineHandle::spawn(board(), storage);

    let first = handle
        .commit_move("a".into(), "active".into(), 0)
        .await
        .unwrap();
    let second = handle
        .commit_move("b".into(), "active".into(), 0)
        .await
        .unwrap();
    let outcome = handle
        .ingest(RemoteEvent::Lane {
            id: "waiting".into(),
            kind: EventKind::Delete,
            version: Version::new(2),
            lane: None,
        })
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Applied);

    gate.add_permits(2);
    for pending in [first, second] {
        let outcome = pending.outcome().await.unwrap();
        assert_eq!(outcome.failure(), Some(&PersistFailure::Conflict));
    }
    assert!(lane_order(&handle, "active").is_empty());
    assert!(handle.snapshot().lane(&"waiting".into()).is_none());
}

#[test_log::test(tokio::test)]
async fn test_write_timeout_rolls_back() {
    let storage = Arc::new(
        ScriptedStorage::new([WriteResponse::ok(2)]).with_delay(Duration::from_secs(30)),
    );
    let config = EngineConfig::default().with_write_timeout(Some(Duration::from_millis(20)));
    let store = board().store().clone();
    let engine = BoardEngine::with_store(config, store).unwrap();
    let (handle, _task) = EngineHandle::spawn(engine, storage);

    let pending = handle.commit_archive("b".into()).await.unwrap();
    assert_eq!(lane_order(&handle, "waiting"), vec!["a"]);

    let outcome = pending.outcome().await.unwrap();
    assert_eq!(outcome.failure(), Some(&PersistFailure::TimedOut));
    assert_eq!(lane_order(&handle, "waiting"), vec!["a", "b"]);
}

#[test_log::test(tokio::test)]
async fn test_drag_gesture_through_handle() {
    let storage = Arc::new(ScriptedStorage::new([WriteResponse::ok(5)]));
    let (handle, _task) = EngineHandle::spawn(board(), storage);

    handle
        .pointer_down("b".into(), Point::new(0.0, 0.0))
        .await
        .unwrap();
    assert_eq!(
        handle.pointer_move(Point::new(2.0, 2.0)).await.unwrap(),
        DragPhase::Armed
    );
    assert_eq!(
        handle.pointer_move(Point::new(40.0, 0.0)).await.unwrap(),
        DragPhase::Dragging
    );
    let preview = handle
        .hover(HoverTarget::Lane("active".into()))
        .await
        .unwrap()
        .expect("preview");
    assert_eq!(preview.index, 0);
    assert_eq!(lane_order(&handle, "active"), vec!["b"]);

    let ReleaseOutcome::Committed { target, pending } = handle.release().await.unwrap() else {
        panic!("expected a committed drop");
    };
    assert_eq!(target.lane.as_str(), "active");
    assert_eq!(pending.card(), &CardId::from("b"));
    assert!(pending.outcome().await.unwrap().is_confirmed());
    assert!(handle.snapshot().preview.is_none());
}

#[test_log::test(tokio::test)]
async fn test_notices_report_settled_mutations() {
    let storage = Arc::new(ScriptedStorage::new([WriteResponse::rejected(
        RejectReason::NotFound,
    )]));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (handle, _task) = EngineRuntime::new(board(), storage)
        .with_notices(NoticeSender::new(tx))
        .spawn();

    let pending = handle
        .commit_move("a".into(), "active".into(), 0)
        .await
        .unwrap();
    pending.outcome().await.unwrap();

    match rx.recv().await.unwrap() {
        EngineNotice::Settled {
            outcome: CommitOutcome::RolledBack { card, failure, .. },
        } => {
            assert_eq!(card.as_str(), "a");
            assert_eq!(failure, PersistFailure::NotFound);
        }
        other => panic!("unexpected notice {:?}", other),
    }
    assert!(handle.snapshot().card(&"a".into()).is_none());
}

#[test_log::test(tokio::test)]
async fn test_lane_renumber_is_persisted_before_the_write() {
    let storage = Arc::new(ScriptedStorage::new([WriteResponse::ok(1)]));
    let store = BoardStore::load(
        vec![Lane::new("lane", "Lane", 0), Lane::new("inbox", "Inbox", 1)],
        vec![
            Card::new("p", "lane", 3, CardPayload::titled("P")),
            Card::new("q", "lane", 3, CardPayload::titled("Q")),
            Card::new("n", "inbox", 0, CardPayload::titled("N")),
        ],
    )
    .unwrap();
    let engine = BoardEngine::with_store(EngineConfig::default(), store).unwrap();
    let (handle, _task) = EngineHandle::spawn(engine, storage.clone());

    let pending = handle
        .commit_move("n".into(), "lane".into(), 1)
        .await
        .unwrap();
    assert!(pending.outcome().await.unwrap().is_confirmed());

    let renumbers = storage.renumbers.lock().await;
    assert_eq!(renumbers.len(), 1);
    assert_eq!(
        renumbers[0].ordered_card_ids,
        vec![CardId::from("p"), CardId::from("q")]
    );
    assert_eq!(lane_order(&handle, "lane"), vec!["p", "n", "q"]);
}

#[test_log::test(tokio::test)]
async fn test_forwarded_remote_stream_is_applied() {
    let storage = Arc::new(ScriptedStorage::new([]));
    let (handle, _task) = EngineHandle::spawn(board(), storage);
    let (tx, rx) = mpsc::channel(8);
    let forwarder = handle.forward_remote(rx);

    tx.send(RemoteEvent::Card {
        id: "c".into(),
        kind: EventKind::Insert,
        version: Version::new(1),
        card: Some(Card::new("c", "active", 0, CardPayload::titled("C"))),
    })
    .await
    .unwrap();
    drop(tx);
    forwarder.await.unwrap();

    // any round trip drains the queue ahead of it
    handle.pointer_move(Point::new(0.0, 0.0)).await.unwrap();
    assert_eq!(lane_order(&handle, "active"), vec!["c"]);
}

#[test_log::test(tokio::test)]
async fn test_shutdown_closes_the_engine() {
    let storage = Arc::new(ScriptedStorage::new([]));
    let (handle, task) = EngineHandle::spawn(board(), storage);

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let err = handle.pointer_move(Point::new(1.0, 1.0)).await.unwrap_err();
    assert!(matches!(err, BoardError::EngineClosed));
}

#[test_log::test(tokio::test)]
async fn test_load_replaces_the_board() {
    let storage = Arc::new(ScriptedStorage::new([]));
    let engine = BoardEngine::new(EngineConfig::default()).unwrap();
    let (handle, _task) = EngineHandle::spawn(engine, storage);
    assert_eq!(handle.snapshot().card_count(), 0);

    handle
        .load(
            vec![Lane::new("todo", "To Do", 0)],
            vec![Card::new("t", "todo", 0, CardPayload::titled("T"))],
        )
        .await
        .unwrap();
    assert_eq!(lane_order(&handle, "todo"), vec!["t"]);
}

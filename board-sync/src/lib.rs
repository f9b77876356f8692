//! Ordering and synchronization engine for kanban boards
//!
//! This crate keeps an in-memory board of lanes and cards consistent while a
//! user drags cards around and other actors change the same board remotely.
//!
//! ## Overview
//!
//! - **Gap-tolerant ordering** - Cards carry `f64` ordinals; a drop lands between its
//!   neighbors and the lane is renumbered only when the gap runs out
//! - **Optimistic moves** - A drop is visible immediately and rolled back exactly
//!   if storage refuses it
//! - **Versioned reconciliation** - Remote events apply only when newer, and wait
//!   while the card has a local mutation in flight
//! - **Single-owner event loop** - One tokio task owns the store; durable writes
//!   never block gestures
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use board_sync::{
//!     BoardEngine, BoardStorage, BoardStore, Card, CardPayload, EngineConfig, EngineHandle, Lane,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(storage: Arc<dyn BoardStorage>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = BoardStore::load(
//!     vec![Lane::new("waiting", "Waiting", 0), Lane::new("active", "Active", 1).with_capacity(2)],
//!     vec![Card::new("a", "waiting", 10, CardPayload::titled("Write docs"))],
//! )?;
//! let engine = BoardEngine::with_store(EngineConfig::default(), store)?;
//! let (handle, _task) = EngineHandle::spawn(engine, storage);
//!
//! let pending = handle.commit_move("a".into(), "active".into(), 0).await?;
//! println!("{:?}", pending.outcome().await?);
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod config;
pub mod drag;
pub mod engine;
mod error;
pub mod pipeline;
pub mod reconcile;
pub mod runtime;
pub mod storage;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use drag::{DragPhase, DropTarget, Edge, HoverTarget, Point};
pub use engine::{BoardEngine, Released, Settled};
pub use error::{BoardError, Result};
pub use pipeline::{CommitOutcome, MutationKind, PreparedWrite};
pub use reconcile::{DropReason, EventKind, ReconcileOutcome, RemoteEvent};
pub use runtime::{
    EngineHandle, EngineNotice, EngineRuntime, NoticeSender, PendingCommit, ReleaseOutcome,
};
pub use storage::{BoardStorage, PersistFailure, RenumberRequest, WriteRequest, WriteResponse};
pub use store::{BoardSnapshot, BoardStore, Change, Preview};
pub use types::{
    CapacityStatus, Card, CardId, CardPayload, Lane, LaneId, Ordinal, Priority, Version,
};

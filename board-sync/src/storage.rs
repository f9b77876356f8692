//! Boundary with the durable storage collaborator.
//!
//! The engine never talks to a database directly. The host application
//! implements [`BoardStorage`] over whatever remote store it uses and feeds
//! that store's change notifications back in as
//! [`RemoteEvent`](crate::RemoteEvent)s.

use crate::types::{CardId, CardPayload, LaneId, Ordinal, Version};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Durable write of one card's placement (and optionally its attributes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub card_id: CardId,
    pub new_lane_id: LaneId,
    pub new_ordinal: Ordinal,
    /// Version the engine saw before mutating; storage rejects with
    /// `conflict` when its copy has moved on
    pub expected_prior_version: Version,
    /// New attributes for edits and archival; `None` for pure moves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<CardPayload>,
}

/// Why storage refused a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// `expected_prior_version` is stale
    Conflict,
    /// The card was deleted remotely
    NotFound,
    TransportError,
}

/// Storage's answer to a [`WriteRequest`]
///
/// Decodes `{"ok": true, "new_version": 4}` and
/// `{"ok": false, "reason": "conflict"}`; the `ok` flag itself is implied by
/// which fields are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WriteResponse {
    Ok { new_version: Version },
    Rejected {
        reason: RejectReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl WriteResponse {
    /// Successful write at `new_version`
    pub fn ok(new_version: u64) -> Self {
        Self::Ok {
            new_version: Version::new(new_version),
        }
    }

    /// Rejected write
    pub fn rejected(reason: RejectReason) -> Self {
        Self::Rejected {
            reason,
            message: None,
        }
    }

    /// Transport failure with a message
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::Rejected {
            reason: RejectReason::TransportError,
            message: Some(message.into()),
        }
    }

    /// Convert into the confirmed version or a persistence failure
    pub fn into_result(self) -> Result<Version, PersistFailure> {
        match self {
            Self::Ok { new_version } => Ok(new_version),
            Self::Rejected { reason, message } => Err(match reason {
                RejectReason::Conflict => PersistFailure::Conflict,
                RejectReason::NotFound => PersistFailure::NotFound,
                RejectReason::TransportError => {
                    PersistFailure::Transport(message.unwrap_or_else(|| "transport error".into()))
                }
            }),
        }
    }
}

/// Recoverable reason a local mutation was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum PersistFailure {
    /// Another writer changed the card first
    Conflict,
    /// The card no longer exists remotely
    NotFound,
    Transport(String),
    /// No answer within the configured write timeout
    TimedOut,
}

impl fmt::Display for PersistFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => f.write_str("conflict: card was changed by someone else"),
            Self::NotFound => f.write_str("not found: card was deleted"),
            Self::Transport(message) => write!(f, "transport error: {}", message),
            Self::TimedOut => f.write_str("timed out waiting for storage"),
        }
    }
}

/// Request to persist a full sequential renumbering of a lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenumberRequest {
    pub lane_id: LaneId,
    /// Cards in their new order; the i-th card gets ordinal `i`
    pub ordered_card_ids: Vec<CardId>,
}

/// Failure of a storage call that has no rollback of its own
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("storage failure: {message}")]
pub struct StorageFailure {
    pub message: String,
}

impl StorageFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Durable storage collaborator
#[async_trait]
pub trait BoardStorage: Send + Sync {
    /// Persist a card's new lane, ordinal and (optionally) attributes
    async fn write_card(&self, request: WriteRequest) -> WriteResponse;

    /// Persist a lane renumbering; the resulting batch event comes back
    /// through the remote change stream
    async fn renumber_lane(&self, request: RenumberRequest) -> Result<(), StorageFailure>;
}

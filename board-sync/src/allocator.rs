//! Ordinal allocation for card placement.
//!
//! A card dropped at index `i` of a lane gets an ordinal strictly between its
//! new neighbors, so nothing else in the lane has to move. When two neighbors
//! are so close that `f64` has no value between them, the caller renumbers the
//! lane with [`renumber`] and allocates again.

use crate::types::{Card, CardId, Ordinal};
use thiserror::Error;

/// The gap at the target index cannot be subdivided any further.
///
/// Expected and recoverable: renumber the lane and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ordinal gap exhausted at index {index}; lane must be renumbered")]
pub struct RenumberRequired {
    pub index: usize,
}

/// Compute the ordinal for a card inserted at `target_index` of `lane_cards`.
///
/// `lane_cards` must be sorted by ordinal and must not contain the card being
/// placed. Index 0 is the head, `lane_cards.len()` the tail; larger indexes
/// are clamped to the tail.
pub fn allocate(
    lane_cards: &[Card],
    target_index: usize,
    step: f64,
) -> Result<Ordinal, RenumberRequired> {
    let index = target_index.min(lane_cards.len());
    let before = index.checked_sub(1).map(|i| lane_cards[i].ordinal.value());
    let after = lane_cards.get(index).map(|c| c.ordinal.value());
    let exhausted = RenumberRequired { index };

    let value = match (before, after) {
        (None, None) => return Ok(Ordinal::BASELINE),
        (None, Some(first)) => {
            let head = first - step;
            if !head.is_finite() || head >= first {
                return Err(exhausted);
            }
            head
        }
        (Some(last), None) => {
            let tail = last + step;
            if !tail.is_finite() || tail <= last {
                return Err(exhausted);
            }
            tail
        }
        (Some(low), Some(high)) => {
            let mid = low / 2.0 + high / 2.0;
            if !(low < mid && mid < high) {
                return Err(exhausted);
            }
            mid
        }
    };

    Ok(Ordinal::new(value))
}

/// Ordinal for a card appended at the end of a lane
pub fn append_ordinal(lane_cards: &[Card], step: f64) -> Result<Ordinal, RenumberRequired> {
    allocate(lane_cards, lane_cards.len(), step)
}

/// Sequential integer ordinals for every card of a lane, keeping current order
pub fn renumber(lane_cards: &[Card]) -> Vec<(CardId, Ordinal)> {
    lane_cards
        .iter()
        .enumerate()
        .map(|(i, card)| (card.id.clone(), Ordinal::new(i as f64)))
        .collect()
}

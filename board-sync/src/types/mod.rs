//! Core types for the board engine

mod card;
mod ids;
mod lane;
mod ordinal;

// Re-export all types
pub use card::{Card, CardPayload, Priority};
pub use ids::{CardId, LaneId};
pub use lane::{CapacityStatus, Lane};
pub use ordinal::{Ordinal, Version};

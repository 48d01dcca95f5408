//! Event boundary types for the mines aggregation engine.
//!
//! The event source decodes contract logs into these payloads and delivers
//! them in block order; everything here is plain data.

pub mod events;
pub mod identity;

pub use alloy_primitives::{Address, B256, U256};

pub use events::{DeliveryMode, EventEnvelope, EventMeta, MinesEvent};
pub use identity::{player_entity_id, GameKey};
